//! End-to-end lifecycle and session-gate scenarios against the simulated host.

use simpledev_core::{
    close_session, destroy_instance, load_module, open_session, CloseOutcome, Descriptor,
    ErrorCode, ExpungeOutcome, HostContext, IoRequest, LoadedModule, MessageType, NoopSetup,
    ResidentTag, SetupError, SharedHost, UnitSetup, SUPPORTED_UNIT,
};
use std::cell::Cell;
use std::rc::Rc;

/// Setup collaborator that counts how many times it ran.
struct CountingSetup {
    calls: Rc<Cell<u32>>,
}

impl UnitSetup for CountingSetup {
    fn initialize(&mut self) -> Result<(), SetupError> {
        self.calls.set(self.calls.get() + 1);
        Ok(())
    }
}

/// Setup collaborator that fails on its first attempt, then succeeds.
struct FailOnceSetup {
    attempts: Rc<Cell<u32>>,
}

impl UnitSetup for FailOnceSetup {
    fn initialize(&mut self) -> Result<(), SetupError> {
        self.attempts.set(self.attempts.get() + 1);
        if self.attempts.get() == 1 {
            return Err(SetupError::new("first attempt fails"));
        }
        Ok(())
    }
}

fn load_baseline(host: &SharedHost, setup: Box<dyn UnitSetup>) -> LoadedModule {
    let tag = ResidentTag::for_descriptor(Descriptor::baseline());
    load_module(host, &tag, setup).expect("baseline module loads")
}

#[test]
fn open_close_cycle_keeps_the_count_balanced() {
    let host = HostContext::shared();
    let loaded = load_baseline(&host, Box::new(NoopSetup));
    let (mut state, mut instance) = (loaded.state, loaded.instance);

    let mut first = IoRequest::new(SUPPORTED_UNIT);
    open_session(&mut state, &mut instance, &mut first, SUPPORTED_UNIT);
    assert_eq!(first.error, ErrorCode::Success);
    assert_eq!(instance.open_count(), 1);

    let mut second = IoRequest::new(SUPPORTED_UNIT);
    open_session(&mut state, &mut instance, &mut second, SUPPORTED_UNIT);
    assert_eq!(second.error, ErrorCode::Success);
    assert_eq!(instance.open_count(), 2);

    let instance = match close_session(&mut state, instance, &mut second) {
        CloseOutcome::Retained(instance) => instance,
        CloseOutcome::Unloaded(_) => panic!("no delete is pending; module must stay resident"),
    };
    assert_eq!(instance.open_count(), 1);

    let instance = match close_session(&mut state, instance, &mut first) {
        CloseOutcome::Retained(instance) => instance,
        CloseOutcome::Unloaded(_) => panic!("no delete is pending; module must stay resident"),
    };
    assert_eq!(instance.open_count(), 0);
    assert!(!instance.delete_pending());
    assert!(host.borrow().is_attached("simple.device"));
}

#[test]
fn open_populates_request_and_close_clears_it() {
    let host = HostContext::shared();
    let loaded = load_baseline(&host, Box::new(NoopSetup));
    let (mut state, mut instance) = (loaded.state, loaded.instance);

    let mut request = IoRequest::new(SUPPORTED_UNIT);
    open_session(&mut state, &mut instance, &mut request, SUPPORTED_UNIT);
    assert_eq!(request.device.as_deref(), Some("simple.device"));
    assert_eq!(request.unit, Some(SUPPORTED_UNIT));
    assert_eq!(request.message_type, MessageType::Reply);

    match close_session(&mut state, instance, &mut request) {
        CloseOutcome::Retained(_) => {}
        CloseOutcome::Unloaded(_) => panic!("no delete is pending"),
    }
    assert!(request.device.is_none());
    assert!(request.unit.is_none());
}

#[test]
fn open_of_unsupported_unit_fails_without_mutating_state() {
    let host = HostContext::shared();
    let calls = Rc::new(Cell::new(0));
    let loaded = load_baseline(
        &host,
        Box::new(CountingSetup {
            calls: Rc::clone(&calls),
        }),
    );
    let (mut state, mut instance) = (loaded.state, loaded.instance);

    let mut request = IoRequest::new(7);
    open_session(&mut state, &mut instance, &mut request, 7);
    assert_eq!(request.error, ErrorCode::OpenFailed);
    assert_eq!(request.error.code(), -1);
    assert_eq!(request.message_type, MessageType::Reply);
    assert_eq!(instance.open_count(), 0);
    assert!(!state.session_open());
    assert_eq!(calls.get(), 0, "setup must not run for a rejected unit");
    assert!(!request.is_open());
}

#[test]
fn destroy_with_open_sessions_defers_until_last_close() {
    let host = HostContext::shared();
    let loaded = load_baseline(&host, Box::new(NoopSetup));
    let (mut state, mut instance) = (loaded.state, loaded.instance);
    let minted_handle = state.module_handle().expect("handle cached at creation");

    let mut request = IoRequest::new(SUPPORTED_UNIT);
    open_session(&mut state, &mut instance, &mut request, SUPPORTED_UNIT);
    assert_eq!(instance.open_count(), 1);

    let instance = match destroy_instance(&mut state, instance) {
        ExpungeOutcome::Deferred(instance) => instance,
        ExpungeOutcome::Unloaded(_) => panic!("a session is open; teardown must defer"),
    };
    assert!(instance.delete_pending());
    assert!(
        host.borrow().is_attached("simple.device"),
        "deferred expunge frees nothing"
    );
    assert_eq!(host.borrow().live_allocation_count(), 1);

    match close_session(&mut state, instance, &mut request) {
        CloseOutcome::Unloaded(handle) => {
            assert_eq!(handle, minted_handle);
            assert!(!handle.is_null());
        }
        CloseOutcome::Retained(_) => panic!("last close with a pending delete must tear down"),
    }

    assert_eq!(state.module_handle(), None, "handle is consumed exactly once");
    assert!(!state.session_open(), "full teardown resets the session flag");
    let host = host.borrow();
    assert!(!host.is_attached("simple.device"));
    assert_eq!(host.live_allocation_count(), 0, "memory released exactly once");
}

#[test]
fn one_time_setup_runs_exactly_once_across_reopens() {
    let host = HostContext::shared();
    let calls = Rc::new(Cell::new(0));
    let loaded = load_baseline(
        &host,
        Box::new(CountingSetup {
            calls: Rc::clone(&calls),
        }),
    );
    let (mut state, mut instance) = (loaded.state, loaded.instance);

    let mut request = IoRequest::new(SUPPORTED_UNIT);
    open_session(&mut state, &mut instance, &mut request, SUPPORTED_UNIT);
    open_session(&mut state, &mut instance, &mut request, SUPPORTED_UNIT);
    assert_eq!(calls.get(), 1);
    assert_eq!(instance.open_count(), 2);

    let instance = match close_session(&mut state, instance, &mut request) {
        CloseOutcome::Retained(instance) => instance,
        CloseOutcome::Unloaded(_) => panic!("no delete is pending"),
    };
    let mut instance = match close_session(&mut state, instance, &mut request) {
        CloseOutcome::Retained(instance) => instance,
        CloseOutcome::Unloaded(_) => panic!("no delete is pending"),
    };

    // Without a full teardown in between, a reopen skips setup.
    open_session(&mut state, &mut instance, &mut request, SUPPORTED_UNIT);
    assert_eq!(calls.get(), 1);
    assert_eq!(instance.open_count(), 1);
}

#[test]
fn failed_setup_leaves_the_gate_closed_and_is_retryable() {
    let host = HostContext::shared();
    let attempts = Rc::new(Cell::new(0));
    let loaded = load_baseline(
        &host,
        Box::new(FailOnceSetup {
            attempts: Rc::clone(&attempts),
        }),
    );
    let (mut state, mut instance) = (loaded.state, loaded.instance);

    let mut request = IoRequest::new(SUPPORTED_UNIT);
    open_session(&mut state, &mut instance, &mut request, SUPPORTED_UNIT);
    assert_eq!(request.error, ErrorCode::OpenFailed);
    assert_eq!(instance.open_count(), 0);
    assert!(!state.session_open(), "failed setup must not latch the flag");
    assert_eq!(attempts.get(), 1);

    // The client retries explicitly; setup runs again and succeeds.
    open_session(&mut state, &mut instance, &mut request, SUPPORTED_UNIT);
    assert_eq!(request.error, ErrorCode::Success);
    assert_eq!(instance.open_count(), 1);
    assert!(state.session_open());
    assert_eq!(attempts.get(), 2);
}

#[test]
fn unbalanced_close_is_ignored_and_never_underflows() {
    let host = HostContext::shared();
    let loaded = load_baseline(&host, Box::new(NoopSetup));
    let (mut state, instance) = (loaded.state, loaded.instance);

    let mut request = IoRequest::new(SUPPORTED_UNIT);
    let instance = match close_session(&mut state, instance, &mut request) {
        CloseOutcome::Retained(instance) => instance,
        CloseOutcome::Unloaded(_) => panic!("nothing was open; nothing may tear down"),
    };
    assert_eq!(instance.open_count(), 0);
    assert!(host.borrow().is_attached("simple.device"));
}

#[test]
fn destroy_with_no_sessions_unloads_immediately() {
    let host = HostContext::shared();
    let loaded = load_baseline(&host, Box::new(NoopSetup));
    let (mut state, instance) = (loaded.state, loaded.instance);
    let minted_handle = state.module_handle().expect("handle cached at creation");

    match destroy_instance(&mut state, instance) {
        ExpungeOutcome::Unloaded(handle) => assert_eq!(handle, minted_handle),
        ExpungeOutcome::Deferred(_) => panic!("no sessions are open; teardown must run"),
    }
    let host = host.borrow();
    assert!(!host.is_attached("simple.device"));
    assert_eq!(host.live_allocation_count(), 0);
}
