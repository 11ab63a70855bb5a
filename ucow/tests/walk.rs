//! The address-space walk: every present page reaches the duplicator,
//! and holes are crossed at span granularity rather than page by page.

mod common;

use common::*;
use exocall::layout::{PFTEMP, USTACKTOP, UTEXT, uxstack_page};
use exocall::{ExoCall, PAGE_SIZE};
use simkern::SimKernel;

#[test]
fn duplicates_exactly_the_present_pages() {
    let mut sim = SimKernel::new();
    let env = sim.boot();
    let mut h = sim.as_env(env);
    let me = h.env_id();

    // A deliberately sparse space: one page at the bottom of the range,
    // one at the top, the exception stack, and half a terabyte of holes
    // in between.
    h.page_alloc(me, UTEXT, rw()).unwrap();
    h.page_alloc(me, USTACKTOP - PAGE_SIZE, rw()).unwrap();
    h.page_alloc(me, uxstack_page(), rw()).unwrap();
    drop(h);

    let (child, _) = fork_child(&mut sim, env);

    let child_pages = sim.mappings(child);
    assert_eq!(child_pages.len(), 3);
    for va in [UTEXT, USTACKTOP - PAGE_SIZE] {
        let pte = sim.mapping(child, va).unwrap();
        assert!(pte.is_cow() && !pte.is_writable());
    }
    // The exception stack is present but private, not a product of the
    // walk.
    assert_ne!(
        sim.mapping(child, uxstack_page()).unwrap().pa(),
        sim.mapping(env, uxstack_page()).unwrap().pa()
    );
}

#[test]
fn holes_are_crossed_at_span_granularity() {
    let mut sim = SimKernel::new();
    let env = sim.boot();
    let mut h = sim.as_env(env);
    let me = h.env_id();
    h.page_alloc(me, UTEXT, rw()).unwrap();
    h.page_alloc(me, USTACKTOP - PAGE_SIZE, rw()).unwrap();
    h.page_alloc(me, uxstack_page(), rw()).unwrap();
    drop(h);

    sim.reset_view_reads();
    let _ = fork_child(&mut sim, env);

    // The range spans 2^28 page slots. A page-at-a-time scan would read
    // at least that many leaf entries; the hierarchical walk pays a few
    // reads per populated 2 MiB region plus a few per skipped span.
    let reads = sim.view_reads();
    assert!(reads < 20_000, "walk read {reads} entries");
    assert!(reads > 0);
}

#[test]
fn pages_outside_the_walked_range_are_not_duplicated() {
    let mut sim = SimKernel::new();
    let env = sim.boot();
    let mut h = sim.as_env(env);
    let me = h.env_id();
    h.page_alloc(me, UTEXT, rw()).unwrap();
    // Below the walk floor: reachable by the environment, never forked.
    h.page_alloc(me, PFTEMP - PAGE_SIZE, rw()).unwrap();
    drop(h);

    let (child, _) = fork_child(&mut sim, env);
    assert!(sim.mapping(child, UTEXT).is_some());
    assert!(sim.mapping(child, PFTEMP - PAGE_SIZE).is_none());
}
