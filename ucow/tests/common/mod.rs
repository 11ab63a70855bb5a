//! Shared scaffolding for the integration suites: a small, recognizable
//! address space and a fork driver.

#![allow(dead_code)]

use exocall::layout::{USTACKTOP, UTEXT, uxstack_page};
use exocall::{EnvId, EnvSelf, ExoCall, ForkResult, PAGE_SIZE, PteFlags, Va};
use simkern::SimKernel;

pub fn data0() -> Va {
    UTEXT
}

pub fn data1() -> Va {
    UTEXT + PAGE_SIZE
}

pub fn rodata() -> Va {
    UTEXT + 2 * PAGE_SIZE
}

pub fn stack() -> Va {
    USTACKTOP - PAGE_SIZE
}

pub fn xstack() -> Va {
    uxstack_page()
}

pub fn rw() -> PteFlags {
    PteFlags::P | PteFlags::RW | PteFlags::US
}

pub fn ro() -> PteFlags {
    PteFlags::P | PteFlags::US
}

/// Boot an environment with two writable data pages, one read-only page,
/// a stack page, and a populated exception stack.
pub fn boot_populated(sim: &mut SimKernel) -> EnvId {
    let env = sim.boot();
    let mut h = sim.as_env(env);
    let me = h.env_id();
    for va in [data0(), data1(), rodata(), stack(), xstack()] {
        h.page_alloc(me, va, rw()).unwrap();
    }
    drop(h);

    sim.user_write(env, data0(), b"data page zero").unwrap();
    sim.user_write(env, data1(), b"data page one").unwrap();
    sim.user_write(env, rodata(), b"immutable bytes").unwrap();
    sim.user_write(env, stack(), b"stack frame").unwrap();
    sim.user_write(env, xstack(), b"exception stack").unwrap();

    // Content in place, drop write permission on the read-only page.
    let mut h = sim.as_env(env);
    h.page_map(me, rodata(), me, rodata(), ro()).unwrap();
    env
}

/// Run `fork` in `parent` and return the new child plus the parent's
/// identity handle.
pub fn fork_child(sim: &mut SimKernel, parent: EnvId) -> (EnvId, EnvSelf) {
    let mut h = sim.as_env(parent);
    let mut me = EnvSelf::current(&h);
    match ucow::fork::fork(&mut h, &mut me).expect("fork failed") {
        ForkResult::Parent(child) => (child, me),
        ForkResult::Child => unreachable!("a parent handle answered as the child"),
    }
}

pub fn read_bytes<const N: usize>(sim: &mut SimKernel, env: EnvId, va: Va) -> [u8; N] {
    let mut buf = [0u8; N];
    sim.user_read(env, va, &mut buf).expect("read failed");
    buf
}
