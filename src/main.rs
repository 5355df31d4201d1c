use clap::Parser;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tofpub::{
    acquire::AcquisitionLoop, args::Args, camera::DeviceBackend, control::ControlFacade,
    publish::ZenohBoundary, session::Session,
};
use zenoh::prelude::sync::SyncResolve;

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signal: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    env_logger::init();

    let zenoh_config = zenoh::config::Config::from(args.clone());
    let zenoh_session = zenoh::open(zenoh_config).res_sync()?.into_arc();
    debug!("opened zenoh session");

    let boundary = Arc::new(ZenohBoundary::new(zenoh_session, args.topic.clone()));

    let session = Session::new(
        Box::new(DeviceBackend),
        args.session_config(),
        args.loop_params(),
        args.on_preset(),
        args.idle_preset(),
    )
    .shared();

    let facade = ControlFacade::new(session.clone());
    facade.advertise(boundary.as_ref());
    debug!("advertised control services");

    unsafe {
        libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
    }

    info!(
        "starting acquisition for {}:{} (data port {})",
        args.target, args.control_port, args.data_port
    );

    let acquisition = AcquisitionLoop::new(session, boundary, args.loop_options());
    let handle = thread::Builder::new()
        .name("acquire".to_string())
        .spawn(move || acquisition.run(&STOP))?;

    if handle.join().is_err() {
        warn!("acquisition thread panicked");
    }
    info!("acquisition loop stopped");

    Ok(())
}
