//! CLI smoke entry point.
//!
//! # Responsibility
//! - Drive one full load → open → submit → close → expunge cycle against a
//!   fresh simulated host.
//! - Keep output deterministic for quick local sanity checks.

use simpledev_core::{
    cancel_request, close_session, destroy_instance, load_module, open_session, submit_request,
    CloseOutcome, Descriptor, ExpungeOutcome, HostContext, IoRequest, NoopSetup, ResidentTag,
    StubProcessor, SUPPORTED_UNIT,
};

fn main() {
    println!("simpledev_core version={}", simpledev_core::core_version());

    let host = HostContext::shared();
    let tag = ResidentTag::for_descriptor(Descriptor::baseline());
    let loaded = match load_module(&host, &tag, Box::new(NoopSetup)) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("load failed: {err}");
            std::process::exit(1);
        }
    };
    let mut state = loaded.state;
    let mut instance = loaded.instance;
    println!(
        "loaded device={} id_string=\"{}\"",
        instance.name(),
        instance.id_string()
    );

    let mut request = IoRequest::new(SUPPORTED_UNIT);
    open_session(&mut state, &mut instance, &mut request, SUPPORTED_UNIT);
    println!(
        "open error={} open_count={}",
        request.error,
        instance.open_count()
    );

    let mut processor = StubProcessor;
    if let Err(err) = submit_request(&instance, &mut request, &mut processor) {
        println!("submit rejected: {err} (error={})", request.error);
    }
    let outcome = cancel_request(&instance, &mut request, &mut processor);
    println!("cancel outcome={outcome:?}");

    // Expunge while the session is still open defers teardown to the close.
    let instance = match destroy_instance(&mut state, instance) {
        ExpungeOutcome::Deferred(instance) => {
            println!("expunge deferred delete_pending={}", instance.delete_pending());
            instance
        }
        ExpungeOutcome::Unloaded(_) => {
            eprintln!("expunge ran with a session still open");
            std::process::exit(1);
        }
    };

    match close_session(&mut state, instance, &mut request) {
        CloseOutcome::Unloaded(handle) => {
            println!("closed; module unloaded handle={}", handle.raw());
        }
        CloseOutcome::Retained(instance) => {
            eprintln!(
                "close left the module resident open_count={}",
                instance.open_count()
            );
            std::process::exit(1);
        }
    }

    let host = host.borrow();
    println!(
        "host clean attached={} live_allocations={}",
        host.attached_count(),
        host.live_allocation_count()
    );
}
