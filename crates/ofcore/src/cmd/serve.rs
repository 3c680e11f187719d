use ofcore_controller::{Controller, ControllerListener, PollScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{controller_error, io_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.controller_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    runtime.block_on(async move {
        let controller = Controller::new(config.clone())
            .map_err(|err| controller_error("invalid configuration", err))?;
        let mut events = controller.subscribe(&args.events);

        let listener = ControllerListener::bind(args.listen, controller.clone())
            .await
            .map_err(|err| controller_error("bind failed", err))?;
        info!(addr = %listener.local_addr(), versions = ?config.versions(), "controller ready");

        let shutdown = CancellationToken::new();
        let scheduler = PollScheduler::new(config.stats_interval);
        let poller = tokio::spawn({
            let controller = controller.clone();
            let shutdown = shutdown.clone();
            async move { scheduler.run(controller, shutdown).await }
        });
        let acceptor = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { listener.run(shutdown).await }
        });

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut printed = 0usize;
        loop {
            tokio::select! {
                signal = &mut ctrl_c => {
                    if let Err(err) = signal {
                        warn!(error = %err, "signal handler failed");
                    }
                    info!("interrupted, shutting down");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    print_event(&event, format);
                    printed = printed.saturating_add(1);
                    if args.count.is_some_and(|count| printed >= count) {
                        break;
                    }
                }
            }
        }

        shutdown.cancel();
        match acceptor.await {
            Ok(Err(err)) => warn!(error = %err, "listener stopped with error"),
            Err(err) => warn!(error = %err, "listener task failed"),
            Ok(Ok(())) => {}
        }
        if let Err(err) = poller.await {
            warn!(error = %err, "poll scheduler task failed");
        }
        Ok(SUCCESS)
    })
}
