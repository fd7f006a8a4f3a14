//! Text dump of lowered modules for debugging and golden tests.

use std::collections::HashMap;

use grebe_hlo::{Handle, Shape};

use crate::{Function, GlobalKind, Module, OpKind, Operation, Value};

fn format_value(module: &Module, func: &Function, value: &Value) -> String {
    match value {
        Value::Argument { index } => {
            let arg = &func.args[*index as usize];
            format!("argument {index} @{} ({} bytes)", arg.name, arg.size)
        }
        Value::GlobalRef { global } => {
            format!("global @{}", module.globals[*global].name)
        }
        Value::View {
            base,
            offset,
            element_type,
            dims,
            layout,
        } => {
            let shape = Shape::Array {
                element_type: *element_type,
                dims: dims.clone(),
                layout: layout.clone(),
            };
            format!("view %v{} + {offset}: {shape}", base.index())
        }
        Value::Tuple { elements } => {
            let parts: Vec<_> = elements.iter().map(|h| format!("%v{}", h.index())).collect();
            format!("tuple({})", parts.join(", "))
        }
        Value::Null => "null".to_string(),
        Value::OpResult { op, index } => {
            format!("result {index} of {} [%{}]", func.ops[*op].kind.mnemonic(), func.ops[*op].label)
        }
        Value::RegionArg {
            region,
            index,
            element_type,
        } => {
            format!("arg {index} of @{}: {element_type}", func.regions[*region].name)
        }
    }
}

fn write_attrs(out: &mut String, kind: &OpKind) {
    use std::fmt::Write as _;

    // The write! calls below cannot fail on a String.
    let _ = match kind {
        OpKind::Compare { direction } => write!(out, " direction={}", direction.name()),
        OpKind::ConstantScalar { literal } => write!(out, " value={}", literal.format_elements()),
        OpKind::Sort {
            dimension,
            is_stable,
        } => write!(out, " dimension={dimension} stable={is_stable}"),
        OpKind::Scatter {
            indices_are_sorted,
            unique_indices,
            ..
        } => write!(
            out,
            " indices_are_sorted={indices_are_sorted} unique_indices={unique_indices}"
        ),
        OpKind::SelectAndScatter {
            window_dimensions,
            window_strides,
            padding_low,
        } => write!(
            out,
            " window={window_dimensions:?} strides={window_strides:?} padding_low={padding_low:?}"
        ),
        OpKind::CustomCall {
            target,
            backend_config,
            num_args,
            num_results,
        } => {
            let _ = write!(out, " target=\"{target}\" args={num_args} results={num_results}");
            if backend_config.is_empty() {
                Ok(())
            } else {
                write!(out, " config_bytes={}", backend_config.len())
            }
        }
        OpKind::Cholesky { lower } => write!(out, " lower={lower}"),
        OpKind::Gemm {
            alpha_real,
            alpha_imag,
            beta,
            algorithm,
            ..
        } => {
            let _ = write!(out, " alpha_real={alpha_real} alpha_imag={alpha_imag} beta={beta}");
            match algorithm {
                Some(a) => write!(out, " algorithm={a}"),
                None => Ok(()),
            }
        }
        OpKind::Conv {
            algorithm,
            result_scale,
            side_input_scale,
            activation,
            ..
        } => {
            let _ = write!(out, " algorithm={algorithm} result_scale={result_scale}");
            if *side_input_scale != 0.0 {
                let _ = write!(out, " side_input_scale={side_input_scale}");
            }
            if *activation != grebe_hlo::ActivationMode::None {
                write!(out, " activation={}", activation.name())
            } else {
                Ok(())
            }
        }
        OpKind::BatchNorm {
            epsilon,
            feature_index,
            ..
        } => write!(out, " epsilon={epsilon} feature_index={feature_index}"),
        OpKind::Infeed { config } | OpKind::Outfeed { config } => {
            if config.is_empty() {
                Ok(())
            } else {
                write!(out, " config=\"{config}\"")
            }
        }
        OpKind::AllToAll {
            split_dimension,
            replica_groups,
            channel_id,
        } => {
            if let Some(d) = split_dimension {
                let _ = write!(out, " split_dimension={d}");
            }
            write_collective(out, replica_groups, *channel_id)
        }
        OpKind::AllGather {
            all_gather_dimension,
            use_global_device_ids,
            replica_groups,
            channel_id,
        } => {
            let _ = write!(out, " dimension={all_gather_dimension}");
            if *use_global_device_ids {
                let _ = write!(out, " use_global_device_ids=true");
            }
            write_collective(out, replica_groups, *channel_id)
        }
        OpKind::AllReduce {
            replica_groups,
            channel_id,
        }
        | OpKind::AllReduceStart {
            replica_groups,
            channel_id,
        } => write_collective(out, replica_groups, *channel_id),
        OpKind::ReduceScatter {
            scatter_dimension,
            replica_groups,
            channel_id,
        } => {
            let _ = write!(out, " scatter_dimension={scatter_dimension}");
            write_collective(out, replica_groups, *channel_id)
        }
        OpKind::CollectivePermute {
            source_target_pairs,
            channel_id,
        } => {
            let _ = write!(out, " pairs={source_target_pairs:?}");
            match channel_id {
                Some(c) => write!(out, " channel_id={c}"),
                None => Ok(()),
            }
        }
        OpKind::RngGetAndUpdateState { delta } => write!(out, " delta={delta}"),
        OpKind::Fft {
            fft_type,
            fft_length,
        } => write!(out, " type={fft_type} length={fft_length:?}"),
        OpKind::TriangularSolve { options } => write!(
            out,
            " left_side={} lower={} unit_diagonal={} transpose_a={}",
            options.left_side, options.lower, options.unit_diagonal, options.transpose_a
        ),
        OpKind::While { trip_count } => match trip_count {
            Some(n) => write!(out, " trip_count={n}"),
            None => Ok(()),
        },
        _ => Ok(()),
    };
}

fn write_collective(
    out: &mut String,
    groups: &grebe_hlo::ReplicaGroups,
    channel_id: Option<i64>,
) -> std::fmt::Result {
    use std::fmt::Write as _;

    if !groups.groups.is_empty() {
        write!(out, " replica_groups={groups}")?;
    }
    if let Some(c) = channel_id {
        write!(out, " channel_id={c}")?;
    }
    Ok(())
}

fn write_op(
    out: &mut String,
    func: &Function,
    handle: Handle<Operation>,
    results: &HashMap<Handle<Operation>, Vec<Handle<Value>>>,
    indent: usize,
) {
    let pad = " ".repeat(indent);
    let op = &func.ops[handle];

    let mut line = String::new();
    if let Some(rs) = results.get(&handle) {
        let names: Vec<_> = rs.iter().map(|h| format!("%v{}", h.index())).collect();
        line.push_str(&names.join(", "));
        line.push_str(" = ");
    }
    let operands: Vec<_> = op.operands.iter().map(|h| format!("%v{}", h.index())).collect();
    line.push_str(&format!("{}({})", op.kind.mnemonic(), operands.join(", ")));
    write_attrs(&mut line, &op.kind);
    if !op.label.is_empty() {
        line.push_str(&format!(" [%{}]", op.label));
    }
    out.push_str(&format!("{pad}{line}\n"));

    for &region in &op.regions {
        let r = &func.regions[region];
        let args: Vec<_> = r.args.iter().map(|h| format!("%v{}", h.index())).collect();
        if args.is_empty() {
            out.push_str(&format!("{pad}  region @{}:\n", r.name));
        } else {
            out.push_str(&format!("{pad}  region @{}({}):\n", r.name, args.join(", ")));
        }
        for &inner in &r.body {
            write_op(out, func, inner, results, indent + 4);
        }
    }
}

fn dump_function(out: &mut String, module: &Module, func: &Function) {
    let args: Vec<_> = func
        .args
        .iter()
        .map(|arg| format!("@{}: {} bytes", arg.name, arg.size))
        .collect();
    out.push_str(&format!("  fn @{}({}) {{\n", func.name, args.join(", ")));

    // Map each op to its result values so SSA definitions print in the body.
    let mut results: HashMap<Handle<Operation>, Vec<Handle<Value>>> = HashMap::new();
    for (handle, value) in func.values.iter() {
        if let Value::OpResult { op, .. } = value {
            results.entry(*op).or_default().push(handle);
        }
    }
    for rs in results.values_mut() {
        rs.sort();
    }

    if !func.values.is_empty() {
        out.push_str("    Values:\n");
        for (handle, value) in func.values.iter() {
            out.push_str(&format!(
                "      %v{} = {}\n",
                handle.index(),
                format_value(module, func, value)
            ));
        }
    }

    if !func.body.is_empty() {
        out.push_str("    Body:\n");
        for &op in &func.body {
            write_op(out, func, op, &results, 6);
        }
    }

    out.push_str("  }\n");
}

/// Produces a human-readable text dump of a [`Module`].
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();
    out.push_str(&format!("module @{}\n", module.name));

    if !module.globals.is_empty() {
        out.push_str("\nGlobals:\n");
        for (handle, global) in module.globals.iter() {
            match &global.kind {
                GlobalKind::Scratch => {
                    out.push_str(&format!(
                        "  {handle:?} @{}: {} bytes scratch\n",
                        global.name, global.size
                    ));
                }
                GlobalKind::Constant { data } => {
                    out.push_str(&format!(
                        "  {handle:?} @{}: {} bytes constant = {}\n",
                        global.name,
                        global.size,
                        format_bytes(data)
                    ));
                }
            }
        }
    }

    if !module.functions.is_empty() {
        out.push_str("\nFunctions:\n");
        for (_, func) in module.functions.iter() {
            dump_function(&mut out, module, func);
        }
    }

    out
}

fn format_bytes(data: &[u8]) -> String {
    let mut out = String::from("0x");
    for byte in data.iter().take(16) {
        out.push_str(&format!("{byte:02x}"));
    }
    if data.len() > 16 {
        out.push_str("..");
    }
    out
}
