//! `listen`: print dispatched events until Ctrl-C.

use std::time::Duration;

use tracing::{debug, info};

use carelink_api::WsConnector;
use carelink_core::{Callbacks, ChannelManager, ChannelState, CoreError, redact_url};

use crate::cli::{GlobalOpts, ListenArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{Printer, should_color};

fn callbacks(printer: Printer) -> Callbacks {
    Callbacks::new()
        .on_new_message(move |message| printer.new_message(&message))
        .on_message_read(move |thread_id, message_id| printer.message_read(thread_id, message_id))
        .on_thread_update(move |thread_id, thread| printer.thread_update(thread_id, &thread))
        .on_error(move |message| printer.server_error(&message))
}

pub async fn handle(args: ListenArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve_channel(global)?;
    let printer = Printer::new(global.output, should_color(global.color));

    let endpoint = redact_url(&resolved.channel.endpoint);
    info!(
        profile = %resolved.profile_name,
        %endpoint,
        threads = args.threads.len(),
        "starting listener"
    );

    let manager = ChannelManager::spawn(
        resolved.channel,
        WsConnector::new(resolved.connect_timeout),
        callbacks(printer),
    );
    for thread_id in &args.threads {
        manager.subscribe(*thread_id);
    }
    manager.connect(resolved.identity);

    let target = Target {
        profile: &resolved.profile_name,
        endpoint: &endpoint,
    };
    let outcome = run_until_stopped(&manager, &args, global, printer, &target).await;

    debug!("shutting down channel manager");
    manager.shutdown().await?;
    outcome
}

/// Names used in terminal error messages.
struct Target<'a> {
    profile: &'a str,
    endpoint: &'a str,
}

/// Follow state transitions until Ctrl-C or a terminal state.
async fn run_until_stopped(
    manager: &ChannelManager,
    args: &ListenArgs,
    global: &GlobalOpts,
    printer: Printer,
    target: &Target<'_>,
) -> Result<(), CliError> {
    let mut states = manager.watch_state();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let open_deadline = (args.open_timeout > 0)
        .then(|| tokio::time::Instant::now() + Duration::from_secs(args.open_timeout));
    let mut opened = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("interrupted");
                return Ok(());
            }
            () = sleep_until_opt(open_deadline), if !opened => {
                return Err(CliError::Timeout { seconds: args.open_timeout });
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return Err(CoreError::ManagerStopped.into());
                }
                let state = states.borrow_and_update().clone();
                if !global.quiet {
                    printer.status(&state);
                }
                match state {
                    ChannelState::Open => opened = true,
                    ChannelState::Rejected { reason } => {
                        return Err(CliError::AuthRejected {
                            profile: target.profile.into(),
                            reason: reason.to_string(),
                        });
                    }
                    ChannelState::Failed { attempts } => {
                        return Err(CliError::ConnectionFailed {
                            url: target.endpoint.into(),
                            reason: format!("gave up after {attempts} attempts"),
                        });
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
