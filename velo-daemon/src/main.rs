//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod ibus;

use capctl::caps;
use clap::{App, Arg};
use config::Config;
use nix::unistd::{Uid, User};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;
use velo_protocol::InstanceShared;
use velo_utils::ibus::ibus_channels;

// Process exit codes.
const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_BAD_CONFIG: i32 = 2;

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender =
            tracing_appender::rolling::never(&config.file.dir, &config.file.name);
        tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_ansi(false)
            .with_filter(LevelFilter::from_level(tracing::Level::TRACE))
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(config.stdout.colors)
            .with_filter(LevelFilter::from_level(tracing::Level::TRACE))
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("velo=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

fn privdrop(user: &str) -> nix::Result<()> {
    // Preserve set of permitted capabilities upon privdrop.
    capctl::prctl::set_securebits(capctl::prctl::Secbits::KEEP_CAPS).unwrap();

    // Drop to unprivileged user and group.
    if let Some(user) = User::from_name(user)? {
        nix::unistd::setgroups(&[user.gid])?;
        nix::unistd::setresgid(user.gid, user.gid, user.gid)?;
        nix::unistd::setresuid(user.uid, user.uid, user.uid)?;
    } else {
        error!(name = %user, "failed to find user");
        std::process::exit(EXIT_FAILURE);
    }

    // Set permitted capabilities.
    let mut caps = caps::CapState::empty();
    for cap in [caps::Cap::NET_ADMIN, caps::Cap::NET_RAW] {
        caps.permitted.add(cap);
    }
    if let Err(error) = caps.set_current() {
        error!(%error, "failed to set permitted capabilities");
    }

    Ok(())
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("Velo routing daemon")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = match Config::load(config_file) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("invalid configuration: {}", error);
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };

    // Check for root privileges.
    if !Uid::effective().is_root() {
        eprintln!("need privileged user");
        std::process::exit(EXIT_FAILURE);
    }

    // Initialize tracing.
    init_tracing(&config.logging);

    // Drop privileges.
    if let Err(error) = privdrop(&config.user) {
        error!(%error, "failed to drop root privileges");
        std::process::exit(EXIT_FAILURE);
    }

    // Set panic handler to abort the process if any child task panics.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(EXIT_FAILURE);
    }));

    // We're ready to go!
    info!("starting up");

    let exit_code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(run(config));

    std::process::exit(exit_code);
}

async fn run(config: Config) -> i32 {
    let shared = InstanceShared {
        hostname: None,
        event_recorder_config: Some(config.event_recorder.clone()),
    };

    // Create the message bus connecting the components.
    let ((ibus_tx, _ibus_tx_interface), ibus_rx) = ibus_channels();

    // Run the bus dispatcher.
    let _dispatcher = velo_utils::task::Task::spawn(ibus::dispatcher(ibus_rx));

    // Spawn the protocol instances.
    let mut tasks = vec![];
    if config.protocols.igmp {
        tasks.push(ibus::spawn_protocol::<
            velo_gmp::instance::Instance<velo_gmp::version::Igmp>,
        >("main", &ibus_tx, shared.clone()));
    }
    if config.protocols.mld {
        tasks.push(ibus::spawn_protocol::<
            velo_gmp::instance::Instance<velo_gmp::version::Mld>,
        >("main", &ibus_tx, shared.clone()));
    }
    if config.protocols.olsr {
        tasks.push(ibus::spawn_protocol::<velo_olsr::instance::Instance>(
            "main", &ibus_tx, shared.clone(),
        ));
    }
    if tasks.is_empty() {
        eprintln!("no protocols enabled");
        return EXIT_BAD_CONFIG;
    }

    // Run until a termination signal arrives or a protocol task dies.
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            EXIT_SUCCESS
        }
        _ = sigterm.recv() => {
            info!("shutting down");
            EXIT_SUCCESS
        }
        _ = ibus::wait_any(tasks) => {
            error!("protocol task terminated unexpectedly");
            EXIT_FAILURE
        }
    }
}
