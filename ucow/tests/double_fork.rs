//! Two children of one parent: each is copy-on-write linked only to the
//! frames the parent held at the moment of its own fork.

mod common;

use common::*;
use simkern::SimKernel;

#[test]
fn children_snapshot_different_moments() {
    let mut sim = SimKernel::new();
    let parent = boot_populated(&mut sim);

    let (a, _) = fork_child(&mut sim, parent);
    let old = sim.mapping(parent, data0()).unwrap().pa().unwrap();

    // The parent moves on: its next write materializes a private copy,
    // leaving child A alone on the old frame.
    sim.user_write(parent, data0(), b"second edition").unwrap();
    let new = sim.mapping(parent, data0()).unwrap().pa().unwrap();
    assert_ne!(new, old);
    assert_eq!(sim.mapping(a, data0()).unwrap().pa().unwrap(), old);

    // Child B snapshots the parent as it is NOW: it shares the new
    // frame, and knows nothing of the old one.
    let (b, _) = fork_child(&mut sim, parent);
    assert_eq!(sim.mapping(b, data0()).unwrap().pa().unwrap(), new);
    assert_eq!(sim.refs(new), 2);
    assert_eq!(sim.refs(old), 1);

    assert_eq!(read_bytes::<14>(&mut sim, a, data0()), *b"data page zero");
    assert_eq!(read_bytes::<14>(&mut sim, b, data0()), *b"second edition");
}

#[test]
fn write_in_one_child_never_reaches_the_other() {
    let mut sim = SimKernel::new();
    let parent = boot_populated(&mut sim);
    let (a, _) = fork_child(&mut sim, parent);
    let (b, _) = fork_child(&mut sim, parent);

    // Three-way share until somebody writes.
    let f = sim.mapping(parent, data1()).unwrap().pa().unwrap();
    assert_eq!(sim.refs(f), 3);

    sim.user_write(a, data1(), b"A's edition").unwrap();

    assert_eq!(read_bytes::<13>(&mut sim, a, data1()), *b"A's editionne");
    assert_eq!(read_bytes::<13>(&mut sim, b, data1()), *b"data page one");
    assert_eq!(read_bytes::<13>(&mut sim, parent, data1()), *b"data page one");

    // A left the share; parent and B still hold the original frame.
    assert_eq!(sim.refs(f), 2);
    assert_eq!(sim.mapping(b, data1()).unwrap().pa().unwrap(), f);
    assert_eq!(sim.mapping(parent, data1()).unwrap().pa().unwrap(), f);
}

#[test]
fn a_child_can_fork_again() {
    let mut sim = SimKernel::new();
    let parent = boot_populated(&mut sim);
    let (child, _) = fork_child(&mut sim, parent);

    // The child's pages are copy-on-write from its own fork; forking the
    // child re-demotes them toward the grandchild, and all three
    // generations stay isolated.
    let (grandchild, _) = fork_child(&mut sim, child);
    assert!(sim.is_runnable(grandchild));

    sim.user_write(grandchild, data0(), b"third gen").unwrap();
    assert_eq!(read_bytes::<14>(&mut sim, parent, data0()), *b"data page zero");
    assert_eq!(read_bytes::<14>(&mut sim, child, data0()), *b"data page zero");
    assert_eq!(read_bytes::<9>(&mut sim, grandchild, data0()), *b"third gen");
}
