mod common;

use common::{entry, lower_text, op_kinds, region_op_kinds};
use grebe_lir::OpKind;

#[test]
fn while_loop_nests_condition_and_body() {
    let text = "\
HloModule countdown

%cond (s: s32[]) -> pred[] {
  %s = s32[] parameter(0)
  %zero = s32[] constant(0)
  ROOT %more = pred[] compare(%s, %zero), direction=GT
}

%body (s2: s32[]) -> s32[] {
  %s2 = s32[] parameter(0)
  %one = s32[] constant(1)
  ROOT %next = s32[] subtract(%s2, %one)
}

ENTRY %main (init: s32[]) -> s32[] {
  %init = s32[] parameter(0)
  ROOT %loop = s32[] while(%init), condition=%cond, body=%body
}
";
    let module = lower_text(text, true);
    let f = entry(&module);
    let kinds = op_kinds(f);
    assert_eq!(kinds.len(), 1);
    assert!(matches!(kinds[0], OpKind::While { trip_count: None }));

    let op = &f.ops[f.body[0]];
    assert_eq!(op.regions.len(), 2);
    let cond = region_op_kinds(f, op.regions[0]);
    assert!(matches!(cond[0], OpKind::Compare { .. }));
    assert!(matches!(cond.last().unwrap(), OpKind::Terminator));
    let body = region_op_kinds(f, op.regions[1]);
    assert!(matches!(body[0], OpKind::Binary(_)));
    assert!(matches!(body.last().unwrap(), OpKind::Terminator));
}

#[test]
fn fusion_inside_a_loop_body() {
    let text = "\
HloModule fused_loop

%cond (c: f32[2]) -> pred[] {
  %c = f32[2] parameter(0)
  ROOT %go = pred[] custom-call(%c), custom_call_target=\"keep_going\"
}

%scale (fp: f32[2]) -> f32[2] {
  %fp = f32[2] parameter(0)
  ROOT %sqr = f32[2] multiply(%fp, %fp)
}

%body (b: f32[2]) -> f32[2] {
  %b = f32[2] parameter(0)
  ROOT %step = f32[2] fusion(%b), kind=kLoop, calls=%scale
}

ENTRY %main (v: f32[2]) -> f32[2] {
  %v = f32[2] parameter(0)
  ROOT %iter = f32[2] while(%v), condition=%cond, body=%body
}
";
    let module = lower_text(text, false);
    let f = entry(&module);
    let loop_op = &f.ops[f.body[0]];
    assert!(matches!(loop_op.kind, OpKind::While { .. }));

    let body_ops: Vec<_> = f.regions[loop_op.regions[1]]
        .body
        .iter()
        .map(|&h| &f.ops[h])
        .collect();
    let fusion = body_ops
        .iter()
        .find(|op| matches!(op.kind, OpKind::Fusion))
        .expect("loop body holds the fusion");
    let inner = region_op_kinds(f, fusion.regions[0]);
    assert!(matches!(inner[0], OpKind::Load));
    assert!(inner.iter().any(|k| matches!(k, OpKind::Store)));
}

#[test]
fn conditional_lowers_each_branch() {
    let text = "\
HloModule pick

%on_true (t: f32[2]) -> f32[2] {
  %t = f32[2] parameter(0)
  ROOT %dbl = f32[2] add(%t, %t)
}

%on_false (u: f32[2]) -> f32[2] {
  %u = f32[2] parameter(0)
  ROOT %keep = f32[2] copy(%u)
}

ENTRY %main (which: s32[], v2: f32[2]) -> f32[2] {
  %which = s32[] parameter(0)
  %v2 = f32[2] parameter(1)
  ROOT %pick = f32[2] conditional(%which, %v2, %v2), branch_computations={%on_true, %on_false}
}
";
    let module = lower_text(text, false);
    let f = entry(&module);
    let op = &f.ops[f.body[0]];
    assert!(matches!(op.kind, OpKind::Case));
    assert_eq!(op.operands.len(), 1);
    assert_eq!(op.regions.len(), 2);
    let second = region_op_kinds(f, op.regions[1]);
    assert!(matches!(second[0], OpKind::Copy));
}

#[test]
fn sort_and_scatter_carry_arithmetic_regions() {
    let text = "\
HloModule regions

%less (la: f32[], lb: f32[]) -> pred[] {
  %la = f32[] parameter(0)
  %lb = f32[] parameter(1)
  ROOT %lcmp = pred[] compare(%la, %lb), direction=LT
}

%overwrite (oa: f32[], ob: f32[]) -> f32[] {
  %oa = f32[] parameter(0)
  ROOT %ob = f32[] parameter(1)
}

ENTRY %main (keys: f32[16], idx: s32[4,1], upd: f32[4]) -> f32[16] {
  %keys = f32[16] parameter(0)
  %idx = s32[4,1] parameter(1)
  %upd = f32[4] parameter(2)
  %ordered = f32[16] sort(%keys), dimensions={0}, is_stable=true, to_apply=%less
  ROOT %scattered = f32[16] scatter(%ordered, %idx, %upd), update_window_dims={}, inserted_window_dims={0}, scatter_dims_to_operand_dims={0}, index_vector_dim=1, to_apply=%overwrite
}
";
    let module = lower_text(text, false);
    let f = entry(&module);
    let kinds = op_kinds(f);
    assert!(matches!(kinds[0], OpKind::Sort { dimension: 0, is_stable: true }));
    assert!(matches!(kinds[1], OpKind::Scatter { .. }));

    let sort = &f.ops[f.body[0]];
    assert_eq!(f.regions[sort.regions[0]].args.len(), 2);
    let scatter = &f.ops[f.body[1]];
    // Three operands plus the result view.
    assert_eq!(scatter.operands.len(), 4);
    assert_eq!(scatter.regions.len(), 1);
}

#[test]
fn select_and_scatter_keeps_both_regions() {
    let text = "\
HloModule pooling

%ge (ga: f32[], gb: f32[]) -> pred[] {
  %ga = f32[] parameter(0)
  %gb = f32[] parameter(1)
  ROOT %gcmp = pred[] compare(%ga, %gb), direction=GE
}

%plus (pa: f32[], pb: f32[]) -> f32[] {
  %pa = f32[] parameter(0)
  %pb = f32[] parameter(1)
  ROOT %padd = f32[] add(%pa, %pb)
}

ENTRY %main (src: f32[8], grads: f32[4]) -> f32[8] {
  %src = f32[8] parameter(0)
  %grads = f32[4] parameter(1)
  %zero2 = f32[] constant(0)
  ROOT %sas = f32[8] select-and-scatter(%src, %grads, %zero2), window_dimensions={2}, window_strides={2}, select=%ge, scatter=%plus
}
";
    let module = lower_text(text, false);
    let f = entry(&module);
    let op = &f.ops[f.body[0]];
    let OpKind::SelectAndScatter {
        window_dimensions,
        window_strides,
        ..
    } = &op.kind
    else {
        panic!("expected select-and-scatter");
    };
    assert_eq!(window_dimensions, &vec![2]);
    assert_eq!(window_strides, &vec![2]);
    assert_eq!(op.regions.len(), 2);
}
