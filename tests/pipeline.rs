//! End-to-end middle-end scenarios: build a function, run the pass, check
//! the produced CFG, dominators, liveness, and tied-register data.

use bumpalo::Bump;
use jitforge::core::Error;
use jitforge::ir::{FuncBuilder, NodeId, Operand, RegKind, Signature};
use jitforge::ra::{BlockFlags, BlockId, RaPass};
use jitforge::x64::{gp, Arch, X64Inst, X64Machine};

fn run_x64<'a>(fb: &mut FuncBuilder, arena: &'a Bump) -> (RaPass<'a>, Result<(), Error>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut pass = RaPass::new(arena);
    let mut machine = X64Machine::new(Arch::X64);
    let func = fb.func().unwrap();
    let (body, vregs) = fb.parts_mut();
    let result = pass.run(&mut machine, body, vregs, func);
    (pass, result)
}

/// Every edge must be recorded on both sides.
fn assert_edge_symmetry(pass: &RaPass<'_>) {
    for block in pass.blocks() {
        for &succ in &block.successors {
            assert!(
                pass.block(succ).predecessors.contains(&block.id()),
                "edge {:?} -> {:?} missing on the predecessor side",
                block.id(),
                succ
            );
        }
        for &pred in &block.predecessors {
            assert!(
                pass.block(pred).successors.contains(&block.id()),
                "edge {:?} -> {:?} missing on the successor side",
                pred,
                block.id()
            );
        }
    }
}

/// Walk each block's node range and check that the linked instructions are
/// covered exactly once.
fn assert_instructions_partitioned(fb: &FuncBuilder, pass: &RaPass<'_>) {
    let body = fb.body();
    let mut covered: Vec<NodeId> = Vec::new();
    for block in pass.blocks() {
        let mut node = block.first.unwrap();
        let last = block.last.unwrap();
        loop {
            if body.node(node).acts_as_inst() {
                assert!(!covered.contains(&node), "instruction in two blocks");
                covered.push(node);
            }
            if node == last {
                break;
            }
            node = body.node(node).next().unwrap();
        }
    }

    let linked: Vec<NodeId> = body
        .iter()
        .filter(|&id| body.node(id).acts_as_inst())
        .collect();
    covered.sort_by_key(|id| id.0);
    let mut linked_sorted = linked.clone();
    linked_sorted.sort_by_key(|id| id.0);
    assert_eq!(covered, linked_sorted);
}

fn assert_positions_increasing(fb: &FuncBuilder) {
    let body = fb.body();
    let mut prev = 0;
    for id in body.iter() {
        let position = body.node(id).position;
        assert!(position > prev, "positions must increase along the stream");
        prev = position;
    }
}

fn live_in(pass: &RaPass<'_>, block: BlockId) -> Vec<usize> {
    pass.block(block).live_in.iter_ones().collect()
}

fn live_out(pass: &RaPass<'_>, block: BlockId) -> Vec<usize> {
    pass.block(block).live_out.iter_ones().collect()
}

fn gen(pass: &RaPass<'_>, block: BlockId) -> Vec<usize> {
    pass.block(block).live_gen.iter_ones().collect()
}

fn kill(pass: &RaPass<'_>, block: BlockId) -> Vec<usize> {
    pass.block(block).live_kill.iter_ones().collect()
}

/// `IN = (OUT | GEN) & !KILL` and `OUT = union of successor INs` at the
/// fixpoint.
fn assert_dataflow_consistent(pass: &RaPass<'_>) {
    for block in pass.blocks() {
        let width = block.live_in.len();
        for w in 0..width {
            let expected_in = (block.live_out.get(w) || block.live_gen.get(w))
                && !block.live_kill.get(w);
            assert_eq!(block.live_in.get(w), expected_in);

            let expected_out = block
                .successors
                .iter()
                .any(|&s| pass.block(s).live_in.get(w));
            assert_eq!(block.live_out.get(w), expected_out);
        }
    }
}

#[test]
fn straight_line_function() {
    // S1: one block, v0 written then read.
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    let mov = fb.inst(X64Inst::Mov, &[Operand::Reg(v0), Operand::Imm(1)]);
    fb.inst(X64Inst::Add, &[Operand::Reg(v0), Operand::Imm(2)]);
    let ret = fb.ret(&[Operand::Reg(v0)]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    assert_eq!(pass.block_count(), 1);
    let b0 = BlockId(0);
    assert_eq!(pass.pov(), &[b0]);
    assert_eq!(pass.block(b0).idom, Some(b0));
    assert_eq!(pass.exits(), &[b0]);
    assert_eq!(pass.work_reg_count(), 1);

    // v0 is written before any read: generated and killed within the block.
    assert_eq!(gen(&pass, b0), vec![0]);
    assert_eq!(kill(&pass, b0), vec![0]);
    assert_eq!(live_in(&pass, b0), Vec::<usize>::new());
    assert_eq!(live_out(&pass, b0), Vec::<usize>::new());

    // v0 is live across the mov, dead after the return reads it.
    let mov_snapshot = pass.ra_data(mov).unwrap().live_out.unwrap();
    assert_ne!(mov_snapshot[0] & 1, 0);
    let ret_snapshot = pass.ra_data(ret).unwrap().live_out.unwrap();
    assert_eq!(ret_snapshot[0] & 1, 0);

    assert_edge_symmetry(&pass);
    assert_instructions_partitioned(&fb, &pass);
    assert_positions_increasing(&fb);
    assert_dataflow_consistent(&pass);
}

#[test]
fn if_then_else() {
    // S2: diamond with a conditional jump.
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    let v1 = fb.new_vreg(RegKind::Gp, 8, "v1");
    let l1 = fb.new_label();
    let l2 = fb.new_label();

    fb.inst(X64Inst::Cmp, &[Operand::Reg(v0), Operand::Imm(0)]);
    fb.inst(X64Inst::Je, &[Operand::Label(l1)]);
    fb.inst(X64Inst::Mov, &[Operand::Reg(v1), Operand::Imm(1)]);
    fb.inst(X64Inst::Jmp, &[Operand::Label(l2)]);
    fb.bind(l1);
    fb.inst(X64Inst::Mov, &[Operand::Reg(v1), Operand::Imm(2)]);
    fb.bind(l2);
    fb.ret(&[Operand::Reg(v1)]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    assert_eq!(pass.block_count(), 4);
    let entry = BlockId(0);
    let taken = BlockId(1); // block at l1, created when the branch resolved it
    let fallthrough = BlockId(2);
    let join = BlockId(3);

    // Conditional successor order: taken edge first, fall-through second.
    assert_eq!(pass.block(entry).successors, vec![taken, fallthrough]);
    assert_eq!(pass.block(taken).successors, vec![join]);
    assert_eq!(pass.block(fallthrough).successors, vec![join]);
    assert_eq!(pass.label_block(l1), Some(taken));
    assert_eq!(pass.label_block(l2), Some(join));

    for block in [taken, fallthrough, join] {
        assert_eq!(pass.block(block).idom, Some(entry));
    }

    // POV is a valid bottom-up order: every edge goes down in POV index.
    assert_eq!(pass.pov().len(), 4);
    assert_eq!(pass.pov()[3], entry);
    for block in pass.blocks() {
        for &succ in &block.successors {
            assert!(block.pov_order > pass.block(succ).pov_order);
        }
    }

    // Liveness: w0 = v0 (entry only), w1 = v1 (defined in both arms, read at
    // the join).
    assert_eq!(gen(&pass, entry), vec![0]);
    assert_eq!(kill(&pass, entry), Vec::<usize>::new());
    assert_eq!(kill(&pass, taken), vec![1]);
    assert_eq!(kill(&pass, fallthrough), vec![1]);
    assert_eq!(gen(&pass, join), vec![1]);
    assert_eq!(live_in(&pass, entry), vec![0]);
    assert_eq!(live_out(&pass, taken), vec![1]);
    assert_eq!(live_out(&pass, fallthrough), vec![1]);
    assert_eq!(live_in(&pass, join), vec![1]);
    assert_eq!(live_out(&pass, join), Vec::<usize>::new());

    assert_edge_symmetry(&pass);
    assert_instructions_partitioned(&fb, &pass);
    assert_positions_increasing(&fb);
    assert_dataflow_consistent(&pass);
}

#[test]
fn counted_loop() {
    // S3: a self-loop on the body block.
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    let header = fb.new_label();

    fb.inst(X64Inst::Mov, &[Operand::Reg(v0), Operand::Imm(10)]);
    fb.bind(header);
    fb.inst(X64Inst::Sub, &[Operand::Reg(v0), Operand::Imm(1)]);
    fb.inst(X64Inst::Jne, &[Operand::Label(header)]);
    fb.ret(&[]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    assert_eq!(pass.block_count(), 3);
    let entry = BlockId(0);
    let body = BlockId(1);
    let exit = BlockId(2);

    assert_eq!(pass.block(body).successors, vec![body, exit]);
    assert_eq!(pass.block(body).idom, Some(entry));
    assert_eq!(pass.block(exit).idom, Some(body));

    // The loop header finishes after the exit in post order.
    assert!(pass.block(body).pov_order > pass.block(exit).pov_order);

    assert_eq!(pass.loops().len(), 1);
    let lp = &pass.loops()[0];
    assert_eq!(lp.header, body);
    assert_eq!(pass.block(body).loop_id, Some(lp.id));
    assert_eq!(pass.block(body).weight, 1);
    assert_eq!(pass.block(entry).weight, 0);

    // v0 circulates through the loop.
    assert_eq!(kill(&pass, entry), vec![0]);
    assert_eq!(gen(&pass, body), vec![0]);
    assert_eq!(live_in(&pass, body), vec![0]);
    assert_eq!(live_out(&pass, body), vec![0]);
    assert_eq!(live_out(&pass, entry), vec![0]);
    assert_eq!(live_in(&pass, entry), Vec::<usize>::new());

    assert_edge_symmetry(&pass);
    assert_dataflow_consistent(&pass);
}

#[test]
fn unreachable_tail_is_deleted() {
    // S4: the two moves after an unconditional jump disappear.
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    let v1 = fb.new_vreg(RegKind::Gp, 8, "v1");
    let l2 = fb.new_label();

    fb.inst(X64Inst::Jmp, &[Operand::Label(l2)]);
    fb.inst(X64Inst::Mov, &[Operand::Reg(v0), Operand::Imm(7)]);
    fb.inst(X64Inst::Mov, &[Operand::Reg(v1), Operand::Imm(8)]);
    fb.bind(l2);
    fb.ret(&[]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    assert_eq!(pass.block_count(), 2);
    assert_eq!(pass.stats().nodes_removed, 2);
    // Nothing references v0/v1 anymore.
    assert_eq!(pass.work_reg_count(), 0);

    // The stream now reads: entry, jmp, label, ret, sentinel.
    let body = fb.body();
    let linked: Vec<NodeId> = body.iter().collect();
    assert_eq!(linked.len(), 5);
    assert!(linked.iter().all(|&id| {
        !matches!(
            &body.node(id).kind,
            jitforge::ir::NodeKind::Inst(inst) if inst.inst == X64Inst::Mov.id()
        )
    }));

    assert_eq!(pass.block(BlockId(0)).successors, vec![BlockId(1)]);
    assert_eq!(pass.exits(), &[BlockId(1)]);
    assert_edge_symmetry(&pass);
    assert_positions_increasing(&fb);
}

#[test]
fn division_pins_both_halves() {
    // S5: the widening division ties AX and DX with read-write roles.
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let hi = fb.new_vreg(RegKind::Gp, 8, "hi");
    let lo = fb.new_vreg(RegKind::Gp, 8, "lo");
    let divisor = fb.new_vreg(RegKind::Gp, 8, "divisor");
    let div = fb.inst(
        X64Inst::Div,
        &[
            Operand::Reg(hi),
            Operand::Reg(lo),
            Operand::Reg(divisor),
        ],
    );
    fb.ret(&[Operand::Reg(lo)]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    let data = pass.ra_data(div).unwrap();
    assert_eq!(data.tied_total(), 3);

    let hi_tied = data.find_tied(hi).unwrap();
    assert!(hi_tied.is_read_write());
    assert_eq!(hi_tied.r_phys, Some(gp::DX));
    assert_eq!(hi_tied.w_phys, Some(gp::DX));

    let lo_tied = data.find_tied(lo).unwrap();
    assert!(lo_tied.is_read_write());
    assert_eq!(lo_tied.r_phys, Some(gp::AX));

    let divisor_tied = data.find_tied(divisor).unwrap();
    assert!(divisor_tied.is_read_only());
    assert_eq!(divisor_tied.r_phys, None);

    assert!(data.in_regs.has(RegKind::Gp, 1 << gp::AX));
    assert!(data.in_regs.has(RegKind::Gp, 1 << gp::DX));

    let block = pass.block(BlockId(0));
    assert!(block.has_flag(BlockFlags::HAS_FIXED_REGS));
    assert!(block.reg_stats.has_precolored(RegKind::Gp));
}

#[test]
fn overlapping_fixed_outputs_abort_the_pass() {
    // S6: the widening multiply pins DX and AX on the same register.
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    let v1 = fb.new_vreg(RegKind::Gp, 8, "v1");
    fb.inst(
        X64Inst::Mul,
        &[Operand::Reg(v0), Operand::Reg(v0), Operand::Reg(v1)],
    );
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    assert_eq!(result, Err(Error::OverlappedRegs));

    // The pass unwound: no state survives, and every virtual register's
    // scratch fields are back to neutral.
    assert_eq!(pass.block_count(), 0);
    assert_eq!(pass.work_reg_count(), 0);
    for vreg in fb.vregs().iter() {
        assert!(vreg.scratch.tied.is_none());
        assert!(vreg.scratch.work.is_none());
        assert!(vreg.scratch.stack_slot.is_none());
    }
}

#[test]
fn cpuid_with_shared_register_overlaps() {
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    let v1 = fb.new_vreg(RegKind::Gp, 8, "v1");
    let v2 = fb.new_vreg(RegKind::Gp, 8, "v2");
    fb.inst(
        X64Inst::Cpuid,
        &[
            Operand::Reg(v0),
            Operand::Reg(v0),
            Operand::Reg(v1),
            Operand::Reg(v2),
        ],
    );
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (_pass, result) = run_x64(&mut fb, &arena);
    assert_eq!(result, Err(Error::OverlappedRegs));
}

#[test]
fn adjacent_labels_share_a_block() {
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let l1 = fb.new_label();
    let l2 = fb.new_label();

    fb.inst(X64Inst::Jmp, &[Operand::Label(l2)]);
    fb.bind(l1);
    fb.bind(l2);
    fb.ret(&[]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    assert_eq!(pass.block_count(), 2);
    assert_eq!(pass.label_block(l1), pass.label_block(l2));
    assert_eq!(pass.label_block(l2), Some(BlockId(1)));
}

#[test]
fn missing_end_sentinel_is_rejected() {
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    fb.ret(&[]);
    // end_func() never called.

    let arena = Bump::new();
    let (_pass, result) = run_x64(&mut fb, &arena);
    assert_eq!(result, Err(Error::InvalidState));
}

#[test]
fn jump_without_label_operand_is_rejected() {
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    fb.inst(X64Inst::Jmp, &[Operand::Reg(v0)]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (_pass, result) = run_x64(&mut fb, &arena);
    assert_eq!(result, Err(Error::InvalidState));
}

#[test]
fn rep_string_op_pins_counter_and_pointers() {
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let dst = fb.new_vreg(RegKind::Gp, 8, "dst");
    let src = fb.new_vreg(RegKind::Gp, 8, "src");
    let count = fb.new_vreg(RegKind::Gp, 8, "count");
    let movs = fb.inst_extra(
        X64Inst::Movs,
        count,
        &[Operand::Reg(dst), Operand::Reg(src)],
    );
    fb.ret(&[]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    let data = pass.ra_data(movs).unwrap();
    assert_eq!(data.tied_total(), 3);
    assert_eq!(data.find_tied(dst).unwrap().r_phys, Some(gp::DI));
    assert_eq!(data.find_tied(src).unwrap().r_phys, Some(gp::SI));
    let counter = data.find_tied(count).unwrap();
    assert!(counter.is_read_write());
    assert_eq!(counter.r_phys, Some(gp::CX));
    assert_eq!(counter.w_phys, Some(gp::CX));
}

#[test]
fn call_site_pins_arguments_and_clobbers() {
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let a = fb.new_vreg(RegKind::Gp, 8, "a");
    let b = fb.new_vreg(RegKind::Gp, 8, "b");
    let r = fb.new_vreg(RegKind::Gp, 8, "r");
    let target = fb.new_vreg(RegKind::Gp, 8, "target");
    let call = fb.call(
        Operand::Reg(target),
        &[Operand::Reg(a), Operand::Reg(b)],
        [Some(r), None],
    );
    fb.ret(&[Operand::Reg(r)]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    let data = pass.ra_data(call).unwrap();
    assert_eq!(data.find_tied(a).unwrap().r_phys, Some(gp::DI));
    assert_eq!(data.find_tied(b).unwrap().r_phys, Some(gp::SI));
    let ret_tied = data.find_tied(r).unwrap();
    assert!(ret_tied.is_write_only());
    assert_eq!(ret_tied.w_phys, Some(gp::AX));
    assert_eq!(data.find_tied(target).unwrap().r_phys, None);

    assert!(data.clobbered.has(RegKind::Gp, 1 << gp::AX));
    assert!(data.clobbered.has(RegKind::Vec, 1));

    let entry = pass.block(BlockId(0));
    assert!(entry.has_flag(BlockFlags::HAS_FUNC_CALLS));
    // A call does not end the block.
    assert_eq!(pass.block_count(), 1);
}

#[test]
fn memory_operands_read_base_and_index() {
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let dst = fb.new_vreg(RegKind::Gp, 8, "dst");
    let base = fb.new_vreg(RegKind::Gp, 8, "base");
    let index = fb.new_vreg(RegKind::Gp, 8, "index");
    let mov = fb.inst(
        X64Inst::Mov,
        &[
            Operand::Reg(dst),
            Operand::Mem(jitforge::ir::MemOperand::base_index(base, index, 3, 16)),
        ],
    );
    fb.ret(&[Operand::Reg(dst)]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    let data = pass.ra_data(mov).unwrap();
    assert_eq!(data.tied_total(), 3);
    assert!(data.find_tied(dst).unwrap().is_write_only());
    assert!(data.find_tied(base).unwrap().is_read_only());
    assert!(data.find_tied(index).unwrap().is_read_only());
}

#[test]
fn scratch_state_cleared_after_success() {
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    fb.inst(X64Inst::Mov, &[Operand::Reg(v0), Operand::Imm(1)]);
    fb.ret(&[Operand::Reg(v0)]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (_pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    for vreg in fb.vregs().iter() {
        assert!(vreg.scratch.tied.is_none());
        assert!(vreg.scratch.work.is_none());
        assert!(vreg.scratch.stack_slot.is_none());
    }
}

#[test]
fn pass_is_idempotent() {
    // Running the pass twice over the same stream yields identical results.
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    let v1 = fb.new_vreg(RegKind::Gp, 8, "v1");
    let l1 = fb.new_label();
    let l2 = fb.new_label();
    fb.inst(X64Inst::Cmp, &[Operand::Reg(v0), Operand::Imm(0)]);
    fb.inst(X64Inst::Je, &[Operand::Label(l1)]);
    fb.inst(X64Inst::Mov, &[Operand::Reg(v1), Operand::Imm(1)]);
    fb.inst(X64Inst::Jmp, &[Operand::Label(l2)]);
    fb.bind(l1);
    fb.inst(X64Inst::Mov, &[Operand::Reg(v1), Operand::Imm(2)]);
    fb.bind(l2);
    fb.ret(&[Operand::Reg(v1)]);
    fb.end_func().unwrap();

    type Snapshot = Vec<(u32, Option<BlockId>, Vec<BlockId>, Vec<usize>, Vec<usize>, Vec<usize>, Vec<usize>)>;
    let snapshot = |pass: &RaPass<'_>| -> Snapshot {
        pass.blocks()
            .iter()
            .map(|b| {
                (
                    b.pov_order,
                    b.idom,
                    b.successors.clone(),
                    b.live_gen.iter_ones().collect(),
                    b.live_kill.iter_ones().collect(),
                    b.live_in.iter_ones().collect(),
                    b.live_out.iter_ones().collect(),
                )
            })
            .collect()
    };

    let arena1 = Bump::new();
    let (pass1, result1) = run_x64(&mut fb, &arena1);
    result1.unwrap();
    let first = snapshot(&pass1);
    drop(pass1);

    let arena2 = Bump::new();
    let (pass2, result2) = run_x64(&mut fb, &arena2);
    result2.unwrap();
    assert_eq!(first, snapshot(&pass2));
}

#[test]
fn nearest_common_dominator_properties() {
    let mut fb = FuncBuilder::new();
    fb.add_func(Signature::default()).unwrap();
    let v0 = fb.new_vreg(RegKind::Gp, 8, "v0");
    let v1 = fb.new_vreg(RegKind::Gp, 8, "v1");
    let l1 = fb.new_label();
    let l2 = fb.new_label();
    fb.inst(X64Inst::Cmp, &[Operand::Reg(v0), Operand::Imm(0)]);
    fb.inst(X64Inst::Je, &[Operand::Label(l1)]);
    fb.inst(X64Inst::Mov, &[Operand::Reg(v1), Operand::Imm(1)]);
    fb.inst(X64Inst::Jmp, &[Operand::Label(l2)]);
    fb.bind(l1);
    fb.inst(X64Inst::Mov, &[Operand::Reg(v1), Operand::Imm(2)]);
    fb.bind(l2);
    fb.ret(&[Operand::Reg(v1)]);
    fb.end_func().unwrap();

    let arena = Bump::new();
    let (pass, result) = run_x64(&mut fb, &arena);
    result.unwrap();

    let entry = BlockId(0);
    let taken = BlockId(1);
    let fallthrough = BlockId(2);
    let join = BlockId(3);

    let ncd = pass.nearest_common_dominator(taken, fallthrough);
    assert_eq!(ncd, entry);
    assert!(pass.dominates(ncd, taken));
    assert!(pass.dominates(ncd, fallthrough));

    assert_eq!(pass.nearest_common_dominator(taken, join), entry);
    assert_eq!(pass.nearest_common_dominator(entry, join), entry);
    assert!(pass.strictly_dominates(entry, join));
    assert!(!pass.strictly_dominates(join, entry));
}
