//! A software model of the exokernel contract, for driving the library
//! in tests.
//!
//! [`SimKernel`] keeps what a real kernel would keep: a table of physical
//! frames with reference counts, and a table of environments, each with
//! its leaf mappings, runnable flag, and registered fault upcall. A
//! per-environment [`EnvHandle`] implements [`ExoCall`] and
//! [`MappingView`], so the library code under test runs unmodified
//! against it.
//!
//! Two things are modeled beyond the raw system calls:
//!
//! - **Fault dispatch.** [`SimKernel::user_write`] and
//!   [`SimKernel::user_read`] emulate user-mode accesses. An access the
//!   current mapping forbids synchronously invokes the environment's
//!   registered upcall (as the hardware-plus-kernel path would, on the
//!   environment's exception stack) and then retries the access exactly
//!   once. If the upcall fails, or the retry still faults, the
//!   environment is torn down. The single retry is what makes "the write
//!   succeeds without a second fault" an observable property.
//! - **The self-mapped view.** Intermediate-level entries are synthesized
//!   from the leaf set: an entry is present when any leaf below it is
//!   mapped. Every entry read is counted, so a test can put a bound on
//!   how much of the table a walk actually touched.
//!
//! The access-control rule of the contract is enforced: a handle may
//! operate on its own environment or on one that environment created,
//! nothing else. `exofork` from a handle always answers as the parent;
//! [`SimKernel::resume_as_child`] hands out a handle that answers as the
//! child instead, which is how a test drives the child branch of a fork
//! (the simulator's stand-in for the child's resumed execution).

#![no_std]
#![deny(rustdoc::broken_intra_doc_links)]

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cell::Cell;
use exocall::layout::UTOP;
use exocall::{
    EnvId, ExoCall, FaultCause, FaultInfo, FaultUpcall, ForkResult, MappingView, PAGE_SHIFT,
    PAGE_SIZE, Pa, Pte, PteFlags, SysError, Va, Vpn,
};

/// Maximum number of environments the model will create.
const NENV: usize = 64;

/// Maximum number of physical frames the model will hand out.
const NFRAMES: usize = 4096;

/// Physical address of frame 0; frames are contiguous above it.
const FRAME_BASE: usize = 0x10_0000;

struct Frame {
    data: Box<[u8; PAGE_SIZE]>,
    refs: usize,
}

struct Env {
    parent: Option<usize>,
    pages: BTreeMap<usize, (usize, PteFlags)>,
    runnable: bool,
    dead: bool,
    upcall: Option<FaultUpcall>,
    faults: usize,
}

/// Why an emulated user-mode access did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The environment does not exist.
    NoSuchEnv,
    /// The environment is not runnable (never started, or torn down).
    NotRunnable,
    /// The access faulted and no upcall is registered; the environment
    /// was torn down.
    MissingUpcall,
    /// The access faulted and the upcall refused it; the environment was
    /// torn down.
    Aborted(SysError),
    /// The upcall claimed success but the retried access faulted again;
    /// the environment was torn down.
    StillFaulting,
}

/// The modeled kernel.
pub struct SimKernel {
    frames: Vec<Frame>,
    free: Vec<usize>,
    envs: BTreeMap<usize, Env>,
    next_env: usize,
    view_reads: Cell<usize>,
}

impl SimKernel {
    /// An empty model: no frames handed out, no environments.
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            free: Vec::new(),
            envs: BTreeMap::new(),
            next_env: 1,
            view_reads: Cell::new(0),
        }
    }

    /// Create the initial environment, already runnable.
    pub fn boot(&mut self) -> EnvId {
        let id = self.next_env;
        self.next_env += 1;
        self.envs.insert(
            id,
            Env {
                parent: None,
                pages: BTreeMap::new(),
                runnable: true,
                dead: false,
                upcall: None,
                faults: 0,
            },
        );
        EnvId(id)
    }

    /// A syscall handle for `env`.
    ///
    /// # Panics
    /// If `env` does not exist. Handles are a test-driver affordance;
    /// asking for one on a nonexistent environment is a bug in the test.
    pub fn as_env(&mut self, env: EnvId) -> EnvHandle<'_> {
        assert!(
            self.envs.contains_key(&env.into_usize()),
            "no such environment: {env}"
        );
        EnvHandle {
            k: self,
            env: env.into_usize(),
            resumed_child: false,
        }
    }

    /// A syscall handle standing for `env`'s own resumed execution after
    /// its creation: `exofork` on this handle answers
    /// [`ForkResult::Child`].
    ///
    /// # Panics
    /// If `env` does not exist.
    pub fn resume_as_child(&mut self, env: EnvId) -> EnvHandle<'_> {
        let mut h = self.as_env(env);
        h.resumed_child = true;
        h
    }

    /// Emulate a user-mode store of `bytes` at `va` in `env`.
    ///
    /// The range must lie within one page. A store the current mapping
    /// forbids dispatches the environment's fault upcall and retries
    /// once, as described in the crate docs.
    pub fn user_write(&mut self, env: EnvId, va: Va, bytes: &[u8]) -> Result<(), AccessError> {
        assert!(
            va.offset() + bytes.len() <= PAGE_SIZE,
            "store crosses a page boundary"
        );
        let e = self.running(env)?;

        if self.writable_frame(e, va).is_none() {
            self.dispatch_fault(e, va, true)?;
        }
        match self.writable_frame(e, va) {
            Some(frame) => {
                let off = va.offset();
                self.frames[frame].data[off..off + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            None => {
                self.tear_down(e);
                Err(AccessError::StillFaulting)
            }
        }
    }

    /// Emulate a user-mode load of `buf.len()` bytes at `va` in `env`.
    ///
    /// A load of an unmapped address dispatches the fault upcall (which
    /// is expected to refuse it, tearing the environment down).
    pub fn user_read(&mut self, env: EnvId, va: Va, buf: &mut [u8]) -> Result<(), AccessError> {
        assert!(
            va.offset() + buf.len() <= PAGE_SIZE,
            "load crosses a page boundary"
        );
        let e = self.running(env)?;

        if self.present_frame(e, va).is_none() {
            self.dispatch_fault(e, va, false)?;
        }
        match self.present_frame(e, va) {
            Some(frame) => {
                let off = va.offset();
                buf.copy_from_slice(&self.frames[frame].data[off..off + buf.len()]);
                Ok(())
            }
            None => {
                self.tear_down(e);
                Err(AccessError::StillFaulting)
            }
        }
    }

    /// The leaf entry at `va` in `env`, or `None` if unmapped.
    pub fn mapping(&self, env: EnvId, va: Va) -> Option<Pte> {
        let e = self.envs.get(&env.into_usize())?;
        let (frame, flags) = *e.pages.get(&va.vpn().into_usize())?;
        Some(Pte::compose(self.pa_of(frame), flags))
    }

    /// All leaf mappings of `env`, in address order.
    pub fn mappings(&self, env: EnvId) -> Vec<(Vpn, Pte)> {
        let e = self.envs.get(&env.into_usize()).expect("no such environment");
        e.pages
            .iter()
            .map(|(&vpn, &(frame, flags))| {
                let va = Va::new(vpn << PAGE_SHIFT).unwrap();
                (va.vpn(), Pte::compose(self.pa_of(frame), flags))
            })
            .collect()
    }

    /// The reference count of the frame at `pa`.
    pub fn refs(&self, pa: Pa) -> usize {
        let idx = (pa.into_usize() - FRAME_BASE) / PAGE_SIZE;
        self.frames[idx].refs
    }

    /// Whether `env` is eligible for scheduling.
    pub fn is_runnable(&self, env: EnvId) -> bool {
        self.envs
            .get(&env.into_usize())
            .map(|e| e.runnable && !e.dead)
            .unwrap_or(false)
    }

    /// Whether `env` has a fault upcall registered.
    pub fn has_upcall(&self, env: EnvId) -> bool {
        self.envs
            .get(&env.into_usize())
            .map(|e| e.upcall.is_some())
            .unwrap_or(false)
    }

    /// How many faults have been dispatched to `env`'s upcall.
    pub fn faults_serviced(&self, env: EnvId) -> usize {
        self.envs.get(&env.into_usize()).map(|e| e.faults).unwrap_or(0)
    }

    /// How many table-view entries have been read since the last reset.
    pub fn view_reads(&self) -> usize {
        self.view_reads.get()
    }

    /// Reset the table-view read counter.
    pub fn reset_view_reads(&self) {
        self.view_reads.set(0);
    }

    fn pa_of(&self, frame: usize) -> Pa {
        Pa::new(FRAME_BASE + frame * PAGE_SIZE).unwrap()
    }

    fn running(&self, env: EnvId) -> Result<usize, AccessError> {
        let e = env.into_usize();
        let env = self.envs.get(&e).ok_or(AccessError::NoSuchEnv)?;
        if env.dead || !env.runnable {
            return Err(AccessError::NotRunnable);
        }
        Ok(e)
    }

    fn present_frame(&self, e: usize, va: Va) -> Option<usize> {
        let (frame, flags) = *self.envs[&e].pages.get(&va.vpn().into_usize())?;
        flags.contains(PteFlags::P | PteFlags::US).then_some(frame)
    }

    fn writable_frame(&self, e: usize, va: Va) -> Option<usize> {
        let frame = self.present_frame(e, va)?;
        let (_, flags) = self.envs[&e].pages[&va.vpn().into_usize()];
        flags.contains(PteFlags::RW).then_some(frame)
    }

    fn dispatch_fault(&mut self, e: usize, va: Va, write: bool) -> Result<(), AccessError> {
        let Some(upcall) = self.envs[&e].upcall else {
            self.tear_down(e);
            return Err(AccessError::MissingUpcall);
        };
        let mut cause = FaultCause::USER;
        if write {
            cause |= FaultCause::WRITE;
        }
        if self.present_frame(e, va).is_some() {
            cause |= FaultCause::PROTECTION;
        }
        self.envs.get_mut(&e).unwrap().faults += 1;

        let info = FaultInfo::new(cause, va);
        let mut handle = EnvHandle {
            k: self,
            env: e,
            resumed_child: false,
        };
        if let Err(err) = upcall(&mut handle, &info) {
            self.tear_down(e);
            return Err(AccessError::Aborted(err));
        }
        Ok(())
    }

    fn tear_down(&mut self, e: usize) {
        let env = self.envs.get_mut(&e).unwrap();
        env.dead = true;
        env.runnable = false;
    }

    fn alloc_frame(&mut self) -> Result<usize, SysError> {
        if let Some(idx) = self.free.pop() {
            self.frames[idx].data.fill(0);
            self.frames[idx].refs = 1;
            return Ok(idx);
        }
        if self.frames.len() >= NFRAMES {
            return Err(SysError::NoMemory);
        }
        self.frames.push(Frame {
            data: Box::new([0; PAGE_SIZE]),
            refs: 1,
        });
        Ok(self.frames.len() - 1)
    }

    fn unref_frame(&mut self, frame: usize) {
        let f = &mut self.frames[frame];
        f.refs -= 1;
        if f.refs == 0 {
            self.free.push(frame);
        }
    }

    // Install `frame` at `vpn` in env `e`, replacing any previous
    // mapping. The caller has already accounted the new reference.
    fn install(&mut self, e: usize, vpn: usize, frame: usize, flags: PteFlags) {
        if let Some((old, _)) = self.envs.get_mut(&e).unwrap().pages.insert(vpn, (frame, flags)) {
            self.unref_frame(old);
        }
    }
}

impl Default for SimKernel {
    fn default() -> Self {
        Self::new()
    }
}

/// A syscall handle: one environment's view of [`SimKernel`].
pub struct EnvHandle<'a> {
    k: &'a mut SimKernel,
    env: usize,
    resumed_child: bool,
}

impl EnvHandle<'_> {
    fn target(&self, env: EnvId) -> Result<usize, SysError> {
        let t = env.into_usize();
        let target = self.k.envs.get(&t).ok_or(SysError::BadEnvironment)?;
        if target.dead {
            return Err(SysError::BadEnvironment);
        }
        if t != self.env && target.parent != Some(self.env) {
            return Err(SysError::BadEnvironment);
        }
        Ok(t)
    }

    fn user_va(&self, va: Va) -> Result<Va, SysError> {
        if va.offset() != 0 || va >= UTOP {
            return Err(SysError::BadAddress);
        }
        Ok(va)
    }

    fn user_perm(&self, perm: PteFlags) -> Result<PteFlags, SysError> {
        if !PteFlags::USER_MASK.contains(perm) || !perm.contains(PteFlags::P | PteFlags::US) {
            return Err(SysError::InvalidPermission);
        }
        Ok(perm)
    }

    fn leaf(&self, e: usize, vpn: usize) -> Option<(usize, PteFlags)> {
        self.k.envs[&e].pages.get(&vpn).copied()
    }

    fn span_present(&self, lo_vpn: usize, hi_vpn: usize) -> Pte {
        self.k.view_reads.set(self.k.view_reads.get() + 1);
        let populated = self.k.envs[&self.env]
            .pages
            .range(lo_vpn..hi_vpn)
            .next()
            .is_some();
        if populated {
            // Intermediate entries carry no authoritative frame; only the
            // presence and permission bits matter to a reader.
            Pte((PteFlags::P | PteFlags::RW | PteFlags::US).bits())
        } else {
            Pte::NONE
        }
    }
}

impl MappingView for EnvHandle<'_> {
    fn pml4e(&self, index: usize) -> Pte {
        self.span_present(index << 27, (index + 1) << 27)
    }

    fn pdpe(&self, index: usize) -> Pte {
        self.span_present(index << 18, (index + 1) << 18)
    }

    fn pde(&self, index: usize) -> Pte {
        self.span_present(index << 9, (index + 1) << 9)
    }

    fn pte(&self, index: usize) -> Pte {
        self.k.view_reads.set(self.k.view_reads.get() + 1);
        match self.leaf(self.env, index) {
            Some((frame, flags)) => Pte::compose(self.k.pa_of(frame), flags),
            None => Pte::NONE,
        }
    }
}

impl ExoCall for EnvHandle<'_> {
    fn env_id(&self) -> EnvId {
        EnvId(self.env)
    }

    fn exofork(&mut self) -> Result<ForkResult, SysError> {
        if self.resumed_child {
            return Ok(ForkResult::Child);
        }
        if self.k.envs.len() >= NENV {
            return Err(SysError::NoFreeEnv);
        }
        let id = self.k.next_env;
        self.k.next_env += 1;
        self.k.envs.insert(
            id,
            Env {
                parent: Some(self.env),
                pages: BTreeMap::new(),
                runnable: false,
                dead: false,
                upcall: None,
                faults: 0,
            },
        );
        Ok(ForkResult::Parent(EnvId(id)))
    }

    fn page_alloc(&mut self, env: EnvId, va: Va, perm: PteFlags) -> Result<(), SysError> {
        let e = self.target(env)?;
        let va = self.user_va(va)?;
        let perm = self.user_perm(perm)?;
        let frame = self.k.alloc_frame()?;
        self.k.install(e, va.vpn().into_usize(), frame, perm);
        Ok(())
    }

    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: Va,
        dst_env: EnvId,
        dst_va: Va,
        perm: PteFlags,
    ) -> Result<(), SysError> {
        let src = self.target(src_env)?;
        let dst = self.target(dst_env)?;
        let src_va = self.user_va(src_va)?;
        let dst_va = self.user_va(dst_va)?;
        let perm = self.user_perm(perm)?;

        let (frame, src_flags) = self
            .leaf(src, src_va.vpn().into_usize())
            .ok_or(SysError::NoSuchMapping)?;
        if perm.contains(PteFlags::RW) && !src_flags.contains(PteFlags::RW) {
            return Err(SysError::InvalidPermission);
        }

        // Account the new reference before a same-address replacement can
        // release the old one.
        self.k.frames[frame].refs += 1;
        self.k.install(dst, dst_va.vpn().into_usize(), frame, perm);
        Ok(())
    }

    fn page_unmap(&mut self, env: EnvId, va: Va) -> Result<(), SysError> {
        let e = self.target(env)?;
        let va = self.user_va(va)?;
        let (frame, _) = self
            .k
            .envs
            .get_mut(&e)
            .unwrap()
            .pages
            .remove(&va.vpn().into_usize())
            .ok_or(SysError::NoSuchMapping)?;
        self.k.unref_frame(frame);
        Ok(())
    }

    fn set_fault_upcall(&mut self, env: EnvId, upcall: FaultUpcall) -> Result<(), SysError> {
        let e = self.target(env)?;
        self.k.envs.get_mut(&e).unwrap().upcall = Some(upcall);
        Ok(())
    }

    fn set_runnable(&mut self, env: EnvId) -> Result<(), SysError> {
        let e = self.target(env)?;
        self.k.envs.get_mut(&e).unwrap().runnable = true;
        Ok(())
    }

    fn copy_page(&mut self, src: Va, dst: Va) {
        let s = self
            .leaf(self.env, src.page_down().vpn().into_usize())
            .filter(|(_, f)| f.contains(PteFlags::P))
            .map(|(frame, _)| frame)
            .expect("copy_page: source not mapped");
        let d = self
            .leaf(self.env, dst.page_down().vpn().into_usize())
            .filter(|(_, f)| f.contains(PteFlags::P | PteFlags::RW))
            .map(|(frame, _)| frame)
            .expect("copy_page: destination not mapped writable");
        if s != d {
            let buf = self.k.frames[s].data.clone();
            *self.k.frames[d].data = *buf;
        }
    }
}
