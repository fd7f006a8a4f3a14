//! Text rendering of modules, in the source graph's own notation.

use std::fmt;

use crate::attrs::{ComparisonDirection, FftType, ReplicaGroups, Transpose};
use crate::instr::{Instruction, Opcode};
use crate::module::{Computation, HloModule};
use crate::shape::{ElementType, Layout, Shape, ShapeIndex};

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", join(&self.minor_to_major))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Array {
                element_type,
                dims,
                layout,
            } => {
                write!(f, "{element_type}[{}]", join(dims))?;
                if !dims.is_empty() && !layout.is_descending() {
                    write!(f, "{layout}")?;
                }
                Ok(())
            }
            Shape::Tuple(elements) => {
                f.write_str("(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str(")")
            }
            Shape::Token => f.write_str("token[]"),
        }
    }
}

impl fmt::Display for ShapeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", join(&self.0))
    }
}

impl fmt::Display for ReplicaGroups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{{{}}}", join(group))?;
        }
        f.write_str("}")
    }
}

impl fmt::Display for ComparisonDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for FftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Transpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders a module as parseable text.
pub fn dump_module(module: &HloModule) -> String {
    let mut out = String::new();
    out.push_str(&format!("HloModule {}\n", module.name));
    for (handle, computation) in module.computations.iter() {
        out.push('\n');
        let is_entry = module.entry == Some(handle);
        write_computation(&mut out, module, computation, is_entry);
    }
    out
}

fn write_computation(out: &mut String, module: &HloModule, comp: &Computation, is_entry: bool) {
    if is_entry {
        out.push_str("ENTRY ");
    }
    out.push_str(&format!("%{} (", comp.name));

    let mut parameters: Vec<(usize, &Instruction)> = comp
        .instructions
        .iter()
        .filter_map(|&h| module.instructions.try_get(h))
        .filter_map(|i| match i.opcode {
            Opcode::Parameter { number } => Some((number, i)),
            _ => None,
        })
        .collect();
    parameters.sort_by_key(|(n, _)| *n);
    for (i, (_, param)) in parameters.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("{}: {}", param.name, param.shape));
    }

    let result = module
        .instructions
        .try_get(comp.root)
        .map(|r| r.shape.to_string())
        .unwrap_or_else(|| "()".to_string());
    out.push_str(&format!(") -> {result} {{\n"));

    for &handle in &comp.instructions {
        let Some(instruction) = module.instructions.try_get(handle) else {
            continue;
        };
        out.push_str("  ");
        if handle == comp.root {
            out.push_str("ROOT ");
        }
        write_instruction(out, module, instruction);
        out.push('\n');
    }
    out.push_str("}\n");
}

fn write_instruction(out: &mut String, module: &HloModule, instr: &Instruction) {
    out.push_str(&format!("%{} = {} ", instr.name, instr.shape));

    // parameter and constant carry their payload inside the parens.
    match &instr.opcode {
        Opcode::Parameter { number } => {
            out.push_str(&format!("parameter({number})"));
            return;
        }
        Opcode::Constant { literal } => {
            if literal.dims.is_empty() {
                out.push_str(&format!("constant({})", literal.format_elements()));
            } else {
                out.push_str(&format!("constant({{{}}})", literal.format_elements()));
            }
            return;
        }
        _ => {}
    }

    let operands = instr
        .operands
        .iter()
        .map(|&op| {
            module
                .instructions
                .try_get(op)
                .map(|o| format!("%{}", o.name))
                .unwrap_or_else(|| format!("{op:?}"))
        })
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!("{}({operands})", instr.opcode.mnemonic()));

    write_attrs(out, module, &instr.opcode);
}

fn comp_name(module: &HloModule, comp: crate::arena::Handle<Computation>) -> String {
    module
        .computations
        .try_get(comp)
        .map(|c| format!("%{}", c.name))
        .unwrap_or_else(|| format!("{comp:?}"))
}

fn write_attrs(out: &mut String, module: &HloModule, opcode: &Opcode) {
    match opcode {
        Opcode::Compare { direction } => out.push_str(&format!(", direction={direction}")),
        Opcode::GetTupleElement { index } => out.push_str(&format!(", index={index}")),
        Opcode::Sort {
            dimension,
            is_stable,
            comparator,
        } => out.push_str(&format!(
            ", dimensions={{{dimension}}}, is_stable={is_stable}, to_apply={}",
            comp_name(module, *comparator)
        )),
        Opcode::Fusion { fused } => {
            out.push_str(&format!(", kind=kLoop, calls={}", comp_name(module, *fused)));
        }
        Opcode::Scatter {
            dims,
            indices_are_sorted,
            unique_indices,
            update,
        } => out.push_str(&format!(
            ", update_window_dims={{{}}}, inserted_window_dims={{{}}}, \
             scatter_dims_to_operand_dims={{{}}}, index_vector_dim={}, \
             indices_are_sorted={indices_are_sorted}, unique_indices={unique_indices}, to_apply={}",
            join(&dims.update_window_dims),
            join(&dims.inserted_window_dims),
            join(&dims.scatter_dims_to_operand_dims),
            dims.index_vector_dim,
            comp_name(module, *update)
        )),
        Opcode::SelectAndScatter {
            window,
            select,
            scatter,
        } => {
            out.push_str(&format!(
                ", window_dimensions={{{}}}, window_strides={{{}}}, padding_low={{{}}}",
                join(&window.sizes()),
                join(&window.strides()),
                join(&window.padding_low()),
            ));
            if window.has_dilation() {
                let wd: Vec<i64> = window.dimensions.iter().map(|d| d.window_dilation).collect();
                let bd: Vec<i64> = window.dimensions.iter().map(|d| d.base_dilation).collect();
                out.push_str(&format!(
                    ", window_dilation={{{}}}, base_dilation={{{}}}",
                    join(&wd),
                    join(&bd)
                ));
            }
            out.push_str(&format!(
                ", select={}, scatter={}",
                comp_name(module, *select),
                comp_name(module, *scatter)
            ));
        }
        Opcode::CustomCall {
            target,
            backend_config,
            ..
        } => {
            out.push_str(&format!(", custom_call_target=\"{target}\""));
            if !backend_config.is_empty() {
                if backend_config.iter().all(|&b| (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\') {
                    let text: String = backend_config.iter().map(|&b| b as char).collect();
                    out.push_str(&format!(", backend_config=\"{text}\""));
                } else {
                    let hex: String = backend_config.iter().map(|b| format!("{b:02x}")).collect();
                    out.push_str(&format!(", backend_config=0x{hex}"));
                }
            }
        }
        Opcode::Infeed { config } => out.push_str(&format!(", infeed_config=\"{config}\"")),
        Opcode::Outfeed { config } => out.push_str(&format!(", outfeed_config=\"{config}\"")),
        Opcode::AllToAll {
            split_dimension,
            replica_groups,
            channel_id,
        } => {
            if let Some(dim) = split_dimension {
                out.push_str(&format!(", dimensions={{{dim}}}"));
            }
            out.push_str(&format!(", replica_groups={replica_groups}"));
            write_channel(out, *channel_id);
        }
        Opcode::AllGather {
            all_gather_dimension,
            use_global_device_ids,
            replica_groups,
            channel_id,
        } => {
            out.push_str(&format!(
                ", dimensions={{{all_gather_dimension}}}, replica_groups={replica_groups}"
            ));
            if *use_global_device_ids {
                out.push_str(", use_global_device_ids=true");
            }
            write_channel(out, *channel_id);
        }
        Opcode::AllReduce {
            reduction,
            replica_groups,
            channel_id,
        }
        | Opcode::AllReduceStart {
            reduction,
            replica_groups,
            channel_id,
        } => {
            out.push_str(&format!(", replica_groups={replica_groups}"));
            write_channel(out, *channel_id);
            out.push_str(&format!(", to_apply={}", comp_name(module, *reduction)));
        }
        Opcode::ReduceScatter {
            scatter_dimension,
            reduction,
            replica_groups,
            channel_id,
        } => {
            out.push_str(&format!(
                ", dimensions={{{scatter_dimension}}}, replica_groups={replica_groups}"
            ));
            write_channel(out, *channel_id);
            out.push_str(&format!(", to_apply={}", comp_name(module, *reduction)));
        }
        Opcode::CollectivePermute {
            source_target_pairs,
            channel_id,
        } => {
            let pairs = source_target_pairs
                .iter()
                .map(|(s, t)| format!("{{{s},{t}}}"))
                .collect::<Vec<_>>()
                .join(",");
            out.push_str(&format!(", source_target_pairs={{{pairs}}}"));
            write_channel(out, *channel_id);
        }
        Opcode::RngGetAndUpdateState { delta } => out.push_str(&format!(", delta={delta}")),
        Opcode::Fft {
            fft_type,
            fft_length,
        } => out.push_str(&format!(
            ", fft_type={fft_type}, fft_length={{{}}}",
            join(fft_length)
        )),
        Opcode::TriangularSolve { options } => out.push_str(&format!(
            ", left_side={}, lower={}, unit_diagonal={}, transpose_a={}",
            options.left_side, options.lower, options.unit_diagonal, options.transpose_a
        )),
        Opcode::While {
            condition,
            body,
            trip_count,
        } => {
            out.push_str(&format!(
                ", condition={}, body={}",
                comp_name(module, *condition),
                comp_name(module, *body)
            ));
            if let Some(n) = trip_count {
                out.push_str(&format!(", trip_count={n}"));
            }
        }
        Opcode::Case { branches } => {
            let names = branches
                .iter()
                .map(|&b| comp_name(module, b))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(", branch_computations={{{names}}}"));
        }
        Opcode::Broadcast { dimensions } => {
            out.push_str(&format!(", dimensions={{{}}}", join(dimensions)));
        }
        Opcode::Transpose { permutation } => {
            out.push_str(&format!(", dimensions={{{}}}", join(permutation)));
        }
        Opcode::Iota { iota_dimension } => {
            out.push_str(&format!(", iota_dimension={iota_dimension}"));
        }
        Opcode::Reduce {
            dimensions,
            reduction,
        } => out.push_str(&format!(
            ", dimensions={{{}}}, to_apply={}",
            join(dimensions),
            comp_name(module, *reduction)
        )),
        _ => {}
    }
}

fn write_channel(out: &mut String, channel_id: Option<i64>) {
    if let Some(id) = channel_id {
        out.push_str(&format!(", channel_id={id}"));
    }
}
