//! The shared-memory fork entry point: a documented stub that must
//! refuse without touching anything.

mod common;

use common::*;
use exocall::SysError;
use simkern::SimKernel;
use ucow::ForkError;

#[test]
fn always_refuses() {
    let mut sim = SimKernel::new();
    let parent = boot_populated(&mut sim);
    let mut h = sim.as_env(parent);
    let err = ucow::fork::sfork(&mut h).unwrap_err();
    assert_eq!(err, ForkError::SharedForkUnimplemented);
    assert!(err.is_benign());
    // At the boundary this surfaces as the designated code.
    assert_eq!(SysError::from(err), SysError::NotImplemented);
}

#[test]
fn mutates_nothing() {
    let mut sim = SimKernel::new();
    let parent = boot_populated(&mut sim);

    let mappings_before = sim.mappings(parent);
    let refs_before: Vec<usize> = mappings_before
        .iter()
        .map(|(_, pte)| sim.refs(pte.pa().unwrap()))
        .collect();
    let content_before = read_bytes::<14>(&mut sim, parent, data0());

    let mut h = sim.as_env(parent);
    assert!(ucow::fork::sfork(&mut h).is_err());
    drop(h);

    // Mappings, reference counts, and content are byte-for-byte as they
    // were; no upcall was registered and no fault was serviced.
    assert_eq!(sim.mappings(parent), mappings_before);
    let refs_after: Vec<usize> = mappings_before
        .iter()
        .map(|(_, pte)| sim.refs(pte.pa().unwrap()))
        .collect();
    assert_eq!(refs_after, refs_before);
    assert_eq!(read_bytes::<14>(&mut sim, parent, data0()), content_before);
    assert!(!sim.has_upcall(parent));
    assert_eq!(sim.faults_serviced(parent), 0);
}
