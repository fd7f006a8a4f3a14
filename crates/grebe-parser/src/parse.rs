//! Recursive-descent parser assembling a module from tokens.

use std::collections::HashMap;

use grebe_hlo::{
    BinaryKind, ComparisonDirection, Computation, ElementType, FftType, Handle, HloModule,
    Instruction, Layout, Literal, Opcode, ReplicaGroups, Shape, Transpose,
    TriangularSolveOptions, UnaryKind, Window, WindowDimension,
};

use crate::token::{Location, Token, TokenKind};
use crate::ParseError;

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    module: HloModule,
    computations: HashMap<String, Handle<Computation>>,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            module: HloModule::new(""),
            computations: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Token plumbing
    // -----------------------------------------------------------------------

    fn peek(&self) -> &Token {
        // The stream always ends in Eof, which is never consumed.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().kind == *kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Location, ParseError> {
        if self.check(&kind) {
            return Ok(self.advance().location);
        }
        Err(self.unexpected(&kind.describe()))
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.peek().kind.describe(),
            location: self.peek().location,
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Location), ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::Ident(name) => Ok((name, token.location)),
                    _ => unreachable!(),
                }
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn expect_ref(&mut self) -> Result<(String, Location), ParseError> {
        match &self.peek().kind {
            TokenKind::Ref(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::Ref(name) => Ok((name, token.location)),
                    _ => unreachable!(),
                }
            }
            _ => Err(self.unexpected("a '%' reference")),
        }
    }

    fn expect_i64(&mut self) -> Result<i64, ParseError> {
        let negative = self.eat(&TokenKind::Minus);
        match self.peek().kind {
            TokenKind::Int(v) => {
                self.advance();
                Ok(if negative { -v } else { v })
            }
            _ => Err(self.unexpected("an integer")),
        }
    }

    fn expect_usize(&mut self) -> Result<usize, ParseError> {
        let location = self.peek().location;
        let v = self.expect_i64()?;
        usize::try_from(v).map_err(|_| ParseError::UnexpectedToken {
            expected: "a non-negative integer".to_string(),
            found: format!("integer {v}"),
            location,
        })
    }

    // -----------------------------------------------------------------------
    // Module and computations
    // -----------------------------------------------------------------------

    pub(crate) fn parse_module(mut self) -> Result<HloModule, ParseError> {
        let (keyword, _) = self.expect_ident()?;
        if keyword != "HloModule" {
            return Err(self.unexpected("'HloModule'"));
        }
        let (name, _) = self.expect_ident()?;
        self.module.name = name;

        while !self.check(&TokenKind::Eof) {
            self.parse_computation()?;
        }
        Ok(self.module)
    }

    fn parse_computation(&mut self) -> Result<(), ParseError> {
        let is_entry = match &self.peek().kind {
            TokenKind::Ident(name) if name == "ENTRY" => {
                self.advance();
                true
            }
            _ => false,
        };
        let (name, name_loc) = self.expect_ref()?;

        // Signature.
        self.expect(TokenKind::LParen)?;
        let mut signature: Vec<(String, Shape)> = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_ident()?;
                self.expect(TokenKind::Colon)?;
                let shape = self.parse_shape()?;
                signature.push((param, shape));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Arrow)?;
        let result_shape = self.parse_shape()?;

        // Body.
        self.expect(TokenKind::LBrace)?;
        let mut instructions = Vec::new();
        let mut locals: HashMap<String, Handle<Instruction>> = HashMap::new();
        let mut root = None;
        while !self.check(&TokenKind::RBrace) {
            let root_loc = self.peek().location;
            let is_root = match &self.peek().kind {
                TokenKind::Ident(marker) if marker == "ROOT" => {
                    self.advance();
                    true
                }
                _ => false,
            };
            let handle = self.parse_instruction(&mut locals)?;
            instructions.push(handle);
            if is_root {
                if root.is_some() {
                    return Err(ParseError::DuplicateRoot {
                        computation: name,
                        location: root_loc,
                    });
                }
                root = Some(handle);
            }
        }
        self.expect(TokenKind::RBrace)?;

        let root = root.ok_or(ParseError::MissingRoot {
            computation: name.clone(),
        })?;

        self.check_signature(&name, &signature, &instructions)?;
        let actual = &self.module.instructions[root].shape;
        if *actual != result_shape {
            return Err(ParseError::ResultMismatch {
                computation: name,
                declared: result_shape.to_string(),
                actual: actual.to_string(),
            });
        }

        let handle = self
            .module
            .add_computation(Computation::new(name.clone(), instructions, root));
        if self.computations.insert(name.clone(), handle).is_some() {
            return Err(ParseError::DuplicateName {
                name,
                location: name_loc,
            });
        }
        if is_entry {
            if self.module.entry.is_some() {
                return Err(ParseError::DuplicateEntry { location: name_loc });
            }
            self.module.set_entry(handle);
        }
        Ok(())
    }

    /// Every signature entry must have a matching `parameter(i)` instruction
    /// with the same name and shape, and no extra parameters may exist.
    fn check_signature(
        &self,
        computation: &str,
        signature: &[(String, Shape)],
        instructions: &[Handle<Instruction>],
    ) -> Result<(), ParseError> {
        let parameters: Vec<(usize, &Instruction)> = instructions
            .iter()
            .filter_map(|&h| {
                let instruction = &self.module.instructions[h];
                match instruction.opcode {
                    Opcode::Parameter { number } => Some((number, instruction)),
                    _ => None,
                }
            })
            .collect();

        if parameters.len() != signature.len() {
            let name = signature
                .last()
                .map(|(n, _)| n.clone())
                .unwrap_or_else(|| "<none>".to_string());
            return Err(ParseError::SignatureMismatch {
                computation: computation.to_string(),
                name,
            });
        }
        for (number, (name, shape)) in signature.iter().enumerate() {
            let matched = parameters
                .iter()
                .any(|(n, i)| *n == number && i.name == *name && i.shape == *shape);
            if !matched {
                return Err(ParseError::SignatureMismatch {
                    computation: computation.to_string(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Instructions
    // -----------------------------------------------------------------------

    fn parse_instruction(
        &mut self,
        locals: &mut HashMap<String, Handle<Instruction>>,
    ) -> Result<Handle<Instruction>, ParseError> {
        let (name, name_loc) = self.expect_ref()?;
        self.expect(TokenKind::Equals)?;
        let shape = self.parse_shape()?;
        let (opcode_name, opcode_loc) = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;

        // parameter and constant carry a payload instead of operands.
        let (operands, opcode) = match opcode_name.as_str() {
            "parameter" => {
                let number = self.expect_usize()?;
                self.expect(TokenKind::RParen)?;
                (Vec::new(), Opcode::Parameter { number })
            }
            "constant" => {
                let literal = self.parse_literal(&shape, opcode_loc)?;
                self.expect(TokenKind::RParen)?;
                (Vec::new(), Opcode::Constant { literal })
            }
            _ => {
                let mut operands = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        let (operand, operand_loc) = self.expect_ref()?;
                        let handle = *locals.get(&operand).ok_or(ParseError::UndefinedName {
                            name: operand,
                            location: operand_loc,
                        })?;
                        operands.push(handle);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen)?;

                let mut attrs = AttrBag::default();
                while self.eat(&TokenKind::Comma) {
                    let (key, key_loc) = self.expect_ident()?;
                    self.expect(TokenKind::Equals)?;
                    let value = self.parse_attr_value()?;
                    attrs.entries.push((key, value, key_loc));
                }
                let opcode = self.build_opcode(&opcode_name, opcode_loc, &mut attrs)?;
                attrs.finish()?;
                (operands, opcode)
            }
        };

        let handle = self
            .module
            .add_instruction(Instruction::new(name.clone(), opcode, shape, operands));
        if locals.insert(name.clone(), handle).is_some() {
            return Err(ParseError::DuplicateName {
                name,
                location: name_loc,
            });
        }
        Ok(handle)
    }

    fn computation_ref(&self, name: &str, location: Location) -> Result<Handle<Computation>, ParseError> {
        self.computations
            .get(name)
            .copied()
            .ok_or(ParseError::UndefinedName {
                name: name.to_string(),
                location,
            })
    }

    fn build_opcode(
        &self,
        name: &str,
        location: Location,
        attrs: &mut AttrBag,
    ) -> Result<Opcode, ParseError> {
        if let Some(kind) = UnaryKind::from_mnemonic(name) {
            return Ok(Opcode::Unary(kind));
        }
        if let Some(kind) = BinaryKind::from_mnemonic(name) {
            return Ok(Opcode::Binary(kind));
        }

        let opcode = match name {
            "compare" => {
                let (dir, dir_loc) = attrs.require_ident(name, "direction", location)?;
                let direction = ComparisonDirection::from_name(&dir).ok_or_else(|| {
                    ParseError::InvalidAttribute {
                        name: "direction".to_string(),
                        detail: format!("has unknown direction '{dir}'"),
                        location: dir_loc,
                    }
                })?;
                Opcode::Compare { direction }
            }
            "convert" => Opcode::Convert,
            "copy" => Opcode::Copy,
            "select" => Opcode::Select,
            "tuple" => Opcode::Tuple,
            "get-tuple-element" => {
                let (index, index_loc) = attrs.require_int(name, "index", location)?;
                let index = usize::try_from(index).map_err(|_| ParseError::InvalidAttribute {
                    name: "index".to_string(),
                    detail: "must be non-negative".to_string(),
                    location: index_loc,
                })?;
                Opcode::GetTupleElement { index }
            }
            "bitcast" => Opcode::Bitcast,
            "after-all" => Opcode::AfterAll,
            "add-dependency" => Opcode::AddDependency,
            "replica-id" => Opcode::ReplicaId,
            "partition-id" => Opcode::PartitionId,
            "sort" => {
                let dimension = attrs.require_first_dimension(name, location)?;
                let is_stable = attrs.take_bool("is_stable")?.unwrap_or(false);
                let comparator = self.take_computation(attrs, name, "to_apply", location)?;
                Opcode::Sort {
                    dimension,
                    is_stable,
                    comparator,
                }
            }
            "fusion" => {
                // The fusion kind (kLoop, kInput, ...) is accepted and dropped.
                attrs.take_ident("kind")?;
                let fused = self.take_computation(attrs, name, "calls", location)?;
                Opcode::Fusion { fused }
            }
            "scatter" => {
                let dims = grebe_hlo::ScatterDimensionNumbers {
                    update_window_dims: attrs.take_int_list("update_window_dims")?.unwrap_or_default(),
                    inserted_window_dims: attrs
                        .take_int_list("inserted_window_dims")?
                        .unwrap_or_default(),
                    scatter_dims_to_operand_dims: attrs
                        .take_int_list("scatter_dims_to_operand_dims")?
                        .unwrap_or_default(),
                    index_vector_dim: attrs.take_int("index_vector_dim")?.map(|(v, _)| v).unwrap_or(0),
                };
                let indices_are_sorted = attrs.take_bool("indices_are_sorted")?.unwrap_or(false);
                let unique_indices = attrs.take_bool("unique_indices")?.unwrap_or(false);
                let update = self.take_computation(attrs, name, "to_apply", location)?;
                Opcode::Scatter {
                    dims,
                    indices_are_sorted,
                    unique_indices,
                    update,
                }
            }
            "select-and-scatter" => {
                let (sizes, _) = attrs.require_int_list(name, "window_dimensions", location)?;
                let strides = attrs.take_int_list("window_strides")?.unwrap_or_default();
                let padding = attrs.take_int_list("padding_low")?.unwrap_or_default();
                let window_dilation = attrs.take_int_list("window_dilation")?.unwrap_or_default();
                let base_dilation = attrs.take_int_list("base_dilation")?.unwrap_or_default();
                let dimensions = sizes
                    .iter()
                    .enumerate()
                    .map(|(i, &size)| WindowDimension {
                        size,
                        stride: strides.get(i).copied().unwrap_or(1),
                        padding_low: padding.get(i).copied().unwrap_or(0),
                        padding_high: 0,
                        window_dilation: window_dilation.get(i).copied().unwrap_or(1),
                        base_dilation: base_dilation.get(i).copied().unwrap_or(1),
                    })
                    .collect();
                let select = self.take_computation(attrs, name, "select", location)?;
                let scatter = self.take_computation(attrs, name, "scatter", location)?;
                Opcode::SelectAndScatter {
                    window: Window { dimensions },
                    select,
                    scatter,
                }
            }
            "custom-call" => {
                let (target, _) = attrs.require_str(name, "custom_call_target", location)?;
                let backend_config = attrs.take_blob("backend_config")?.unwrap_or_default();
                Opcode::CustomCall {
                    target,
                    backend_config,
                    window: None,
                    conv_dims: None,
                }
            }
            "infeed" => Opcode::Infeed {
                config: attrs.take_str("infeed_config")?.unwrap_or_default(),
            },
            "outfeed" => Opcode::Outfeed {
                config: attrs.take_str("outfeed_config")?.unwrap_or_default(),
            },
            "all-to-all" => Opcode::AllToAll {
                split_dimension: attrs.take_int_list("dimensions")?.and_then(|d| d.first().copied()),
                replica_groups: attrs.replica_groups()?,
                channel_id: attrs.take_int("channel_id")?.map(|(v, _)| v),
            },
            "all-gather" => Opcode::AllGather {
                all_gather_dimension: attrs.require_first_dimension(name, location)?,
                use_global_device_ids: attrs.take_bool("use_global_device_ids")?.unwrap_or(false),
                replica_groups: attrs.replica_groups()?,
                channel_id: attrs.take_int("channel_id")?.map(|(v, _)| v),
            },
            "all-reduce" => Opcode::AllReduce {
                replica_groups: attrs.replica_groups()?,
                channel_id: attrs.take_int("channel_id")?.map(|(v, _)| v),
                reduction: self.take_computation(attrs, name, "to_apply", location)?,
            },
            "all-reduce-start" => Opcode::AllReduceStart {
                replica_groups: attrs.replica_groups()?,
                channel_id: attrs.take_int("channel_id")?.map(|(v, _)| v),
                reduction: self.take_computation(attrs, name, "to_apply", location)?,
            },
            "all-reduce-done" => Opcode::AllReduceDone,
            "reduce-scatter" => Opcode::ReduceScatter {
                scatter_dimension: attrs.require_first_dimension(name, location)?,
                replica_groups: attrs.replica_groups()?,
                channel_id: attrs.take_int("channel_id")?.map(|(v, _)| v),
                reduction: self.take_computation(attrs, name, "to_apply", location)?,
            },
            "collective-permute" => {
                let pairs = attrs
                    .take_group_list("source_target_pairs")?
                    .unwrap_or_default();
                let mut source_target_pairs = Vec::with_capacity(pairs.len());
                for pair in &pairs {
                    match pair.as_slice() {
                        [source, target] => source_target_pairs.push((*source, *target)),
                        _ => {
                            return Err(ParseError::InvalidAttribute {
                                name: "source_target_pairs".to_string(),
                                detail: "wants {source,target} pairs".to_string(),
                                location,
                            })
                        }
                    }
                }
                Opcode::CollectivePermute {
                    source_target_pairs,
                    channel_id: attrs.take_int("channel_id")?.map(|(v, _)| v),
                }
            }
            "rng-get-and-update-state" => Opcode::RngGetAndUpdateState {
                delta: attrs.require_int(name, "delta", location)?.0,
            },
            "fft" => {
                let (kind, kind_loc) = attrs.require_ident(name, "fft_type", location)?;
                let fft_type =
                    FftType::from_name(&kind).ok_or_else(|| ParseError::InvalidAttribute {
                        name: "fft_type".to_string(),
                        detail: format!("has unknown transform '{kind}'"),
                        location: kind_loc,
                    })?;
                Opcode::Fft {
                    fft_type,
                    fft_length: attrs.require_int_list(name, "fft_length", location)?.0,
                }
            }
            "triangular-solve" => {
                let transpose_a = match attrs.take_ident("transpose_a")? {
                    None => Transpose::NoTranspose,
                    Some((value, value_loc)) => Transpose::from_name(&value).ok_or_else(|| {
                        ParseError::InvalidAttribute {
                            name: "transpose_a".to_string(),
                            detail: format!("has unknown transpose '{value}'"),
                            location: value_loc,
                        }
                    })?,
                };
                Opcode::TriangularSolve {
                    options: TriangularSolveOptions {
                        left_side: attrs.take_bool("left_side")?.unwrap_or(false),
                        lower: attrs.take_bool("lower")?.unwrap_or(false),
                        unit_diagonal: attrs.take_bool("unit_diagonal")?.unwrap_or(false),
                        transpose_a,
                    },
                }
            }
            "while" => Opcode::While {
                condition: self.take_computation(attrs, name, "condition", location)?,
                body: self.take_computation(attrs, name, "body", location)?,
                trip_count: attrs.take_int("trip_count")?.map(|(v, _)| v),
            },
            "conditional" => {
                let (branch_names, branches_loc) =
                    attrs.require_ref_list(name, "branch_computations", location)?;
                let mut branches = Vec::with_capacity(branch_names.len());
                for branch in &branch_names {
                    branches.push(self.computation_ref(branch, branches_loc)?);
                }
                Opcode::Case { branches }
            }
            "broadcast" => Opcode::Broadcast {
                dimensions: attrs.take_int_list("dimensions")?.unwrap_or_default(),
            },
            "reshape" => Opcode::Reshape,
            "transpose" => Opcode::Transpose {
                permutation: attrs.take_int_list("dimensions")?.unwrap_or_default(),
            },
            "iota" => Opcode::Iota {
                iota_dimension: attrs.require_int(name, "iota_dimension", location)?.0,
            },
            "reduce" => Opcode::Reduce {
                dimensions: attrs.take_int_list("dimensions")?.unwrap_or_default(),
                reduction: self.take_computation(attrs, name, "to_apply", location)?,
            },
            _ => {
                return Err(ParseError::UnknownOpcode {
                    name: name.to_string(),
                    location,
                })
            }
        };
        Ok(opcode)
    }

    fn take_computation(
        &self,
        attrs: &mut AttrBag,
        opcode: &str,
        key: &str,
        location: Location,
    ) -> Result<Handle<Computation>, ParseError> {
        let (name, name_loc) = attrs.require_ref(opcode, key, location)?;
        self.computation_ref(&name, name_loc)
    }

    // -----------------------------------------------------------------------
    // Shapes, attribute values, literals
    // -----------------------------------------------------------------------

    fn parse_shape(&mut self) -> Result<Shape, ParseError> {
        if self.eat(&TokenKind::LParen) {
            let mut elements = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    elements.push(self.parse_shape()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
            return Ok(Shape::Tuple(elements));
        }

        let (name, location) = self.expect_ident()?;
        if name == "token" {
            self.expect(TokenKind::LBracket)?;
            self.expect(TokenKind::RBracket)?;
            return Ok(Shape::Token);
        }
        let element_type =
            ElementType::from_name(&name).ok_or(ParseError::UnknownType { name, location })?;

        self.expect(TokenKind::LBracket)?;
        let mut dims = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                dims.push(self.expect_i64()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket)?;

        // A `{..}` directly after the dims is a layout only when it opens
        // with a number; otherwise it is a computation body.
        let layout = if self.check(&TokenKind::LBrace)
            && matches!(
                self.tokens.get(self.pos + 1).map(|t| &t.kind),
                Some(TokenKind::Int(_)) | Some(TokenKind::Minus)
            ) {
            self.advance();
            let mut minor_to_major = Vec::new();
            loop {
                minor_to_major.push(self.expect_i64()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace)?;
            Layout { minor_to_major }
        } else {
            Layout::descending(dims.len())
        };

        Ok(Shape::Array {
            element_type,
            dims,
            layout,
        })
    }

    fn parse_attr_value(&mut self) -> Result<AttrValue, ParseError> {
        match &self.peek().kind {
            TokenKind::Minus | TokenKind::Int(_) | TokenKind::Float(_) => {
                let negative = self.eat(&TokenKind::Minus);
                let token = self.advance();
                match token.kind {
                    TokenKind::Int(v) => Ok(AttrValue::Int(if negative { -v } else { v })),
                    TokenKind::Float(v) => Ok(AttrValue::Float(if negative { -v } else { v })),
                    _ => Err(self.unexpected("a number")),
                }
            }
            TokenKind::Str(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::Str(text) => Ok(AttrValue::Str(text)),
                    _ => unreachable!(),
                }
            }
            TokenKind::Blob(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::Blob(bytes) => Ok(AttrValue::Blob(bytes)),
                    _ => unreachable!(),
                }
            }
            TokenKind::Ref(_) => {
                let (name, _) = self.expect_ref()?;
                Ok(AttrValue::Ref(name))
            }
            TokenKind::Ident(name) if name == "true" => {
                self.advance();
                Ok(AttrValue::Bool(true))
            }
            TokenKind::Ident(name) if name == "false" => {
                self.advance();
                Ok(AttrValue::Bool(false))
            }
            TokenKind::Ident(_) => {
                let (name, _) = self.expect_ident()?;
                Ok(AttrValue::Ident(name))
            }
            TokenKind::LBrace => self.parse_brace_value(),
            _ => Err(self.unexpected("an attribute value")),
        }
    }

    fn parse_brace_value(&mut self) -> Result<AttrValue, ParseError> {
        self.expect(TokenKind::LBrace)?;
        if self.eat(&TokenKind::RBrace) {
            return Ok(AttrValue::IntList(Vec::new()));
        }

        match self.peek().kind {
            TokenKind::Ref(_) => {
                let mut names = Vec::new();
                loop {
                    let (name, _) = self.expect_ref()?;
                    names.push(name);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(AttrValue::RefList(names))
            }
            TokenKind::LBrace => {
                let mut groups = Vec::new();
                loop {
                    self.expect(TokenKind::LBrace)?;
                    let mut group = Vec::new();
                    if !self.check(&TokenKind::RBrace) {
                        loop {
                            group.push(self.expect_i64()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RBrace)?;
                    groups.push(group);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(AttrValue::IntListList(groups))
            }
            _ => {
                let mut values = Vec::new();
                loop {
                    values.push(self.expect_i64()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(AttrValue::IntList(values))
            }
        }
    }

    fn parse_literal(&mut self, shape: &Shape, location: Location) -> Result<Literal, ParseError> {
        let Shape::Array {
            element_type, dims, ..
        } = shape
        else {
            return Err(ParseError::InvalidLiteral {
                detail: "constants must have array shapes".to_string(),
                location,
            });
        };

        let mut elements = Vec::new();
        if !self.check(&TokenKind::RParen) {
            self.parse_literal_values(&mut elements)?;
        }

        let expected = shape.element_count();
        if elements.len() as u64 != expected {
            return Err(ParseError::LiteralCount {
                expected,
                found: elements.len(),
                location,
            });
        }

        let mut data = Vec::with_capacity(elements.len() * element_type.byte_size() as usize);
        for element in elements {
            encode_element(*element_type, element, location, &mut data)?;
        }
        Ok(Literal {
            element_type: *element_type,
            dims: dims.clone(),
            data,
        })
    }

    /// Collects literal elements in flat order; brace nesting is accepted at
    /// any depth and ignored, the shape dictates the element count.
    fn parse_literal_values(&mut self, out: &mut Vec<LiteralElement>) -> Result<(), ParseError> {
        if self.eat(&TokenKind::LBrace) {
            if !self.check(&TokenKind::RBrace) {
                loop {
                    self.parse_literal_values(out)?;
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RBrace)?;
            return Ok(());
        }

        let negative = self.eat(&TokenKind::Minus);
        let token = self.advance();
        let element = match token.kind {
            TokenKind::Int(v) => LiteralElement::Int(if negative { -v } else { v }),
            TokenKind::Float(v) => LiteralElement::Float(if negative { -v } else { v }),
            TokenKind::Ident(name) if name == "true" && !negative => LiteralElement::Bool(true),
            TokenKind::Ident(name) if name == "false" && !negative => LiteralElement::Bool(false),
            TokenKind::Blob(bytes) if !negative => LiteralElement::Bits(bytes),
            _ => {
                return Err(ParseError::InvalidLiteral {
                    detail: format!("unexpected {} in literal", token.kind.describe()),
                    location: token.location,
                })
            }
        };
        out.push(element);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Attribute bag
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Ident(String),
    Ref(String),
    Blob(Vec<u8>),
    IntList(Vec<i64>),
    IntListList(Vec<Vec<i64>>),
    RefList(Vec<String>),
}

impl AttrValue {
    fn describe(&self) -> &'static str {
        match self {
            Self::Int(_) => "an integer",
            Self::Float(_) => "a number",
            Self::Bool(_) => "a boolean",
            Self::Str(_) => "a string",
            Self::Ident(_) => "an identifier",
            Self::Ref(_) => "a reference",
            Self::Blob(_) => "a hex blob",
            Self::IntList(_) => "an integer list",
            Self::IntListList(_) => "a nested list",
            Self::RefList(_) => "a reference list",
        }
    }
}

/// Attributes parsed after an instruction, consumed by the opcode builder.
/// Whatever is left over afterwards is an unknown-attribute error.
#[derive(Debug, Default)]
struct AttrBag {
    entries: Vec<(String, AttrValue, Location)>,
}

impl AttrBag {
    fn take(&mut self, key: &str) -> Option<(AttrValue, Location)> {
        let index = self.entries.iter().position(|(k, _, _)| k == key)?;
        let (_, value, location) = self.entries.remove(index);
        Some((value, location))
    }

    fn mismatch(key: &str, expected: &str, value: &AttrValue, location: Location) -> ParseError {
        ParseError::InvalidAttribute {
            name: key.to_string(),
            detail: format!("wants {expected}, found {}", value.describe()),
            location,
        }
    }

    fn take_int(&mut self, key: &str) -> Result<Option<(i64, Location)>, ParseError> {
        match self.take(key) {
            None => Ok(None),
            Some((AttrValue::Int(v), location)) => Ok(Some((v, location))),
            Some((value, location)) => Err(Self::mismatch(key, "an integer", &value, location)),
        }
    }

    fn take_bool(&mut self, key: &str) -> Result<Option<bool>, ParseError> {
        match self.take(key) {
            None => Ok(None),
            Some((AttrValue::Bool(v), _)) => Ok(Some(v)),
            Some((value, location)) => Err(Self::mismatch(key, "a boolean", &value, location)),
        }
    }

    fn take_str(&mut self, key: &str) -> Result<Option<String>, ParseError> {
        match self.take(key) {
            None => Ok(None),
            Some((AttrValue::Str(v), _)) => Ok(Some(v)),
            Some((value, location)) => Err(Self::mismatch(key, "a string", &value, location)),
        }
    }

    fn take_ident(&mut self, key: &str) -> Result<Option<(String, Location)>, ParseError> {
        match self.take(key) {
            None => Ok(None),
            Some((AttrValue::Ident(v), location)) => Ok(Some((v, location))),
            Some((value, location)) => Err(Self::mismatch(key, "an identifier", &value, location)),
        }
    }

    fn take_ref(&mut self, key: &str) -> Result<Option<(String, Location)>, ParseError> {
        match self.take(key) {
            None => Ok(None),
            Some((AttrValue::Ref(v), location)) => Ok(Some((v, location))),
            Some((value, location)) => Err(Self::mismatch(key, "a reference", &value, location)),
        }
    }

    fn take_blob(&mut self, key: &str) -> Result<Option<Vec<u8>>, ParseError> {
        match self.take(key) {
            None => Ok(None),
            Some((AttrValue::Blob(bytes), _)) => Ok(Some(bytes)),
            Some((AttrValue::Str(text), _)) => Ok(Some(text.into_bytes())),
            Some((value, location)) => {
                Err(Self::mismatch(key, "a string or hex blob", &value, location))
            }
        }
    }

    fn take_int_list(&mut self, key: &str) -> Result<Option<Vec<i64>>, ParseError> {
        match self.take(key) {
            None => Ok(None),
            Some((AttrValue::IntList(v), _)) => Ok(Some(v)),
            Some((AttrValue::Int(v), _)) => Ok(Some(vec![v])),
            Some((value, location)) => {
                Err(Self::mismatch(key, "an integer list", &value, location))
            }
        }
    }

    fn take_group_list(&mut self, key: &str) -> Result<Option<Vec<Vec<i64>>>, ParseError> {
        match self.take(key) {
            None => Ok(None),
            Some((AttrValue::IntListList(v), _)) => Ok(Some(v)),
            // `{}` scans as an empty flat list.
            Some((AttrValue::IntList(v), _)) if v.is_empty() => Ok(Some(Vec::new())),
            Some((value, location)) => Err(Self::mismatch(key, "a nested list", &value, location)),
        }
    }

    fn require_ref_list(
        &mut self,
        opcode: &str,
        key: &str,
        location: Location,
    ) -> Result<(Vec<String>, Location), ParseError> {
        match self.take(key) {
            None => Err(Self::missing(opcode, key, location)),
            Some((AttrValue::RefList(v), loc)) => Ok((v, loc)),
            Some((AttrValue::Ref(v), loc)) => Ok((vec![v], loc)),
            Some((value, loc)) => Err(Self::mismatch(key, "a reference list", &value, loc)),
        }
    }

    fn replica_groups(&mut self) -> Result<ReplicaGroups, ParseError> {
        Ok(ReplicaGroups {
            groups: self.take_group_list("replica_groups")?.unwrap_or_default(),
        })
    }

    fn missing(opcode: &str, key: &str, location: Location) -> ParseError {
        ParseError::MissingAttribute {
            opcode: opcode.to_string(),
            name: key.to_string(),
            location,
        }
    }

    fn require_int(
        &mut self,
        opcode: &str,
        key: &str,
        location: Location,
    ) -> Result<(i64, Location), ParseError> {
        self.take_int(key)?.ok_or(Self::missing(opcode, key, location))
    }

    fn require_ident(
        &mut self,
        opcode: &str,
        key: &str,
        location: Location,
    ) -> Result<(String, Location), ParseError> {
        self.take_ident(key)?.ok_or(Self::missing(opcode, key, location))
    }

    fn require_ref(
        &mut self,
        opcode: &str,
        key: &str,
        location: Location,
    ) -> Result<(String, Location), ParseError> {
        self.take_ref(key)?.ok_or(Self::missing(opcode, key, location))
    }

    fn require_str(
        &mut self,
        opcode: &str,
        key: &str,
        location: Location,
    ) -> Result<(String, Location), ParseError> {
        match self.take_str(key)? {
            Some(v) => Ok((v, location)),
            None => Err(Self::missing(opcode, key, location)),
        }
    }

    fn require_int_list(
        &mut self,
        opcode: &str,
        key: &str,
        location: Location,
    ) -> Result<(Vec<i64>, Location), ParseError> {
        match self.take_int_list(key)? {
            Some(v) => Ok((v, location)),
            None => Err(Self::missing(opcode, key, location)),
        }
    }

    /// The `dimensions={n}` attribute used by sort, all-gather, and
    /// reduce-scatter, which carry exactly one dimension.
    fn require_first_dimension(
        &mut self,
        opcode: &str,
        location: Location,
    ) -> Result<i64, ParseError> {
        let (list, list_loc) = self.require_int_list(opcode, "dimensions", location)?;
        list.first()
            .copied()
            .ok_or_else(|| ParseError::InvalidAttribute {
                name: "dimensions".to_string(),
                detail: "wants at least one dimension".to_string(),
                location: list_loc,
            })
    }

    fn finish(self) -> Result<(), ParseError> {
        match self.entries.into_iter().next() {
            None => Ok(()),
            Some((name, _, location)) => Err(ParseError::UnknownAttribute { name, location }),
        }
    }
}

#[derive(Clone, Debug)]
enum LiteralElement {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Raw bit pattern, used for half-width floats.
    Bits(Vec<u8>),
}

fn encode_element(
    ty: ElementType,
    element: LiteralElement,
    location: Location,
    out: &mut Vec<u8>,
) -> Result<(), ParseError> {
    let bad = |detail: String| ParseError::InvalidLiteral { detail, location };
    let int = |element: &LiteralElement| match element {
        LiteralElement::Int(v) => Some(*v),
        _ => None,
    };

    match ty {
        ElementType::Pred => match element {
            LiteralElement::Bool(b) => out.push(b as u8),
            LiteralElement::Int(v) => out.push((v != 0) as u8),
            other => return Err(bad(format!("{other:?} is not a predicate"))),
        },
        ElementType::S8 => {
            let v = int(&element).ok_or_else(|| bad("s8 wants integers".into()))?;
            let v = i8::try_from(v).map_err(|_| bad(format!("{v} does not fit in s8")))?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        ElementType::S16 => {
            let v = int(&element).ok_or_else(|| bad("s16 wants integers".into()))?;
            let v = i16::try_from(v).map_err(|_| bad(format!("{v} does not fit in s16")))?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        ElementType::S32 => {
            let v = int(&element).ok_or_else(|| bad("s32 wants integers".into()))?;
            let v = i32::try_from(v).map_err(|_| bad(format!("{v} does not fit in s32")))?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        ElementType::S64 => {
            let v = int(&element).ok_or_else(|| bad("s64 wants integers".into()))?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        ElementType::U8 => {
            let v = int(&element).ok_or_else(|| bad("u8 wants integers".into()))?;
            let v = u8::try_from(v).map_err(|_| bad(format!("{v} does not fit in u8")))?;
            out.push(v);
        }
        ElementType::U16 => {
            let v = int(&element).ok_or_else(|| bad("u16 wants integers".into()))?;
            let v = u16::try_from(v).map_err(|_| bad(format!("{v} does not fit in u16")))?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        ElementType::U32 => {
            let v = int(&element).ok_or_else(|| bad("u32 wants integers".into()))?;
            let v = u32::try_from(v).map_err(|_| bad(format!("{v} does not fit in u32")))?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        ElementType::U64 => {
            let v = int(&element).ok_or_else(|| bad("u64 wants integers".into()))?;
            let v = u64::try_from(v).map_err(|_| bad(format!("{v} does not fit in u64")))?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        ElementType::F16 | ElementType::Bf16 => match element {
            // Half-width values travel as bit patterns, `0xabcd` style.
            LiteralElement::Bits(bytes) if bytes.len() == 2 => {
                let bits = u16::from_be_bytes([bytes[0], bytes[1]]);
                out.extend_from_slice(&bits.to_le_bytes());
            }
            LiteralElement::Int(v) => {
                let bits =
                    u16::try_from(v).map_err(|_| bad(format!("{v} is not a 16-bit pattern")))?;
                out.extend_from_slice(&bits.to_le_bytes());
            }
            other => return Err(bad(format!("{other:?} is not a 16-bit pattern"))),
        },
        ElementType::F32 => {
            let v = match element {
                LiteralElement::Float(v) => v as f32,
                LiteralElement::Int(v) => v as f32,
                other => return Err(bad(format!("{other:?} is not an f32"))),
            };
            out.extend_from_slice(&v.to_le_bytes());
        }
        ElementType::F64 => {
            let v = match element {
                LiteralElement::Float(v) => v,
                LiteralElement::Int(v) => v as f64,
                other => return Err(bad(format!("{other:?} is not an f64"))),
            };
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    Ok(())
}
