//! Latency and delay-slot tables.
//!
//! `required_delay` answers: how many nop slots would the consumer need if
//! the producer were scheduled immediately before it? Long-latency
//! producers (SFU, texture, memory) are awaited with sync bits instead of
//! nops, so their hard delay is zero; the *soft* variants report how many
//! instructions one would like to put between producer and consumer to
//! avoid stalling on the sync bit.

use crate::ir::{Inst, Shader};

/// ALU results are readable this many cycles after issue.
const ALU_CYCLES: u32 = 6;
/// Forwarding path into the third source of a cat3 consumer.
const ALU_TO_MAD3_CYCLES: u32 = 3;
/// The address registers settle this many cycles after a write.
const ADDR_CYCLES: u32 = 6;

/// Number of nop slots `consumer` needs after `producer` when reading it
/// through source `src_n` with nothing scheduled in between.
///
/// Sync-awaited producers report 0: the wait is expressed with `ss`/`sy`
/// bits, not nops.
pub fn required_delay(sh: &Shader, producer: Inst, consumer: Inst, src_n: usize) -> u32 {
    let p = sh.insts[producer].opcode;
    let c = sh.insts[consumer].opcode;
    if p.is_meta() || c.is_meta() {
        return 0;
    }
    if sh.writes_addr(producer) {
        return ADDR_CYCLES;
    }
    if p.is_ss_producer() || p.is_sy_producer() {
        return 0;
    }
    // The producer is a plain ALU op from here on.
    if c.is_flow() || c.is_sfu() || c.is_tex() || c.is_mem() {
        return ALU_CYCLES;
    }
    if (c.is_mad() || c.is_sad()) && src_n == 2 {
        return ALU_TO_MAD3_CYCLES;
    }
    ALU_CYCLES
}

/// Like [`required_delay`], but charges sync-awaited producers their
/// expected wait time. This is the cost a scheduler wants on its dependency
/// edges: it is the number that makes hiding latency valuable.
pub fn soft_required_delay(sh: &Shader, producer: Inst, consumer: Inst, src_n: usize) -> u32 {
    let p = sh.insts[producer].opcode;
    if p.is_ss_producer() {
        return soft_ss_delay(sh, producer);
    }
    if p.is_sy_producer() {
        return soft_sy_delay(sh, producer);
    }
    required_delay(sh, producer, consumer, src_n)
}

/// Expected wait, in instruction slots, on an `ss` bit consuming
/// `producer`'s result right away: 10 for SFU and fiber-local memory, 6
/// otherwise.
pub fn soft_ss_delay(sh: &Shader, producer: Inst) -> u32 {
    let opc = sh.insts[producer].opcode;
    if opc.is_sfu() || opc.is_local_mem() {
        10
    } else {
        6
    }
}

/// Expected wait on a `sy` bit consuming `producer`'s result right away.
///
/// Texture latency was measured per result-component count, and roughly
/// doubles in double-wave mode where twice as many fibers share the
/// texture path.
pub fn soft_sy_delay(sh: &Shader, producer: Inst) -> u32 {
    let data = &sh.insts[producer];
    if data.opcode.is_tex() {
        let comps = data
            .dsts
            .first()
            .map(|&d| sh.regs[d].wrmask.count_ones())
            .unwrap_or(1)
            .clamp(1, 4) as usize;
        // Measured, indexed by component count.
        const SINGLE: [u32; 4] = [12, 14, 16, 17];
        const DOUBLE: [u32; 4] = [16, 18, 20, 22];
        if sh.double_wave {
            DOUBLE[comps - 1]
        } else {
            SINGLE[comps - 1]
        }
    } else {
        // Global memory loads and atomics.
        14
    }
}

/// Cycles until `producer`'s destinations are readable, keyed by whether
/// the consumer is an ALU op (the forwarding network favors ALU-to-ALU).
pub fn instr_latency(sh: &Shader, producer: Inst, alu_consumer: bool) -> u32 {
    let opc = sh.insts[producer].opcode;
    if opc.is_meta() {
        return 0;
    }
    if sh.writes_addr(producer) {
        return ADDR_CYCLES;
    }
    if opc.is_ss_producer() || opc.is_sy_producer() {
        // Awaited via sync bits; no nop latency.
        return 0;
    }
    if alu_consumer {
        ALU_TO_MAD3_CYCLES
    } else {
        ALU_CYCLES
    }
}

/// Latency of predicate writes, consumed by branches.
pub fn predicate_latency() -> u32 {
    ALU_CYCLES
}
