use anyhow::Result;
use clap::Parser;
use machine_console::{
    api::ApiClient,
    cli::{Args, Command, SimulatorCommand},
    config::{Config, SENSOR_NAMESPACE},
    connection::ConnectionManager,
    error::TelemetryError,
    events::{ClientEvent, EventSender, create_event_channel},
    formatter::{OutputFormat, ReadingFormatter, print_machine, print_machines, print_prediction},
    monitoring::setup_metrics,
    simulator::SimulatorController,
    store::StateStore,
    subscription::SensorSubscription,
    tracing_setup::setup_tracing,
    types::{PredictionRequest, READING_BUFFER_CAPACITY},
    ui::{UIController, UIOptions},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing(&args.log_level, args.json_logs)?;
    info!("machine-console v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_args(&args)?);

    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
        info!("Metrics server started on port {}", config.metrics.port);
    }

    let store = Arc::new(StateStore::load(&config.storage.state_file));
    let api = Arc::new(ApiClient::new(&config.api, Arc::clone(&store)));

    match &args.command {
        Command::SignIn { email, password } => {
            api.sign_in(email, password).await?;
            println!("Signed in as {email}");
        }
        Command::SignOut => {
            api.sign_out().await?;
            println!("Signed out");
        }
        Command::Machines { id } => match id {
            Some(id) => print_machine(&api.machine(id).await?),
            None => print_machines(&api.machines().await?, !args.no_color),
        },
        Command::Readings {
            machine_id,
            limit,
            offset,
        } => {
            let readings = api.sensor_readings(machine_id, *limit, *offset).await?;
            let mut formatter = ReadingFormatter::new(
                OutputFormat::from(args.format.as_str()),
                !args.no_color,
                args.quiet,
            );
            formatter.print_header();
            // REST returns newest first; print oldest first so the table
            // reads down in time
            for reading in readings.iter().rev() {
                formatter.print_reading(reading);
            }
        }
        Command::Watch {
            machine_id,
            poll_interval,
        } => {
            run_watch(&config, &api, &args, machine_id, *poll_interval).await?;
        }
        Command::Simulator { command } => {
            run_simulator(&config, Arc::clone(&api), store, command).await?;
        }
        Command::Predict { machine_id } => {
            run_predict(&api, machine_id, !args.no_color).await?;
        }
    }

    Ok(())
}

async fn run_watch(
    config: &Config,
    api: &Arc<ApiClient>,
    args: &Args,
    machine_id: &str,
    poll_interval: u64,
) -> Result<()> {
    let (event_tx, event_rx) = create_event_channel();

    let mut ui = UIController::new(
        event_rx,
        OutputFormat::from(args.format.as_str()),
        UIOptions {
            colored: !args.no_color,
            quiet: args.quiet,
            max_readings: args.max_readings,
        },
    );
    let mut ui_task = tokio::spawn(async move { ui.run().await });

    let mut manager =
        ConnectionManager::new(config.websocket.clone(), SENSOR_NAMESPACE, event_tx.clone());
    let handle = manager.handle();

    let reading_tx = event_tx.clone();
    let subscription =
        SensorSubscription::attach(&handle, machine_id, event_tx.clone(), move |reading| {
            let _ = reading_tx.try_send(ClientEvent::ReadingReceived(reading));
        });

    let mut manager_task = tokio::spawn(async move { manager.run().await });

    tokio::select! {
        joined = &mut manager_task => {
            subscription.detach();
            match joined? {
                Ok(()) => {}
                Err(e) => {
                    let exhausted = e
                        .downcast_ref::<TelemetryError>()
                        .is_some_and(|t| matches!(t, TelemetryError::MaxReconnectsExceeded));
                    if exhausted {
                        poll_readings(api, machine_id, poll_interval, &event_tx).await?;
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        _ = &mut ui_task => {
            // Display hit its max-readings cutoff; tear the stream down
            subscription.detach();
            handle.close();
            let _ = manager_task.await;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
            subscription.detach();
            handle.close();
            let _ = manager_task.await;
        }
    }

    drop(event_tx);
    let _ = ui_task.await;
    Ok(())
}

/// Degraded mode once the stream has exhausted its reconnect budget: poll the
/// REST readings endpoint and feed unseen readings through the same display
/// pipeline until interrupted.
async fn poll_readings(
    api: &ApiClient,
    machine_id: &str,
    poll_interval: u64,
    events: &EventSender,
) -> Result<()> {
    let period = Duration::from_secs(poll_interval.max(1));
    warn!(
        "Stream unavailable after retries, falling back to REST polling every {}s",
        period.as_secs()
    );

    let mut last_udi: i64 = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, stopping poll loop");
                break;
            }
            _ = tokio::time::sleep(period) => {
                match api
                    .sensor_readings(machine_id, READING_BUFFER_CAPACITY as u32, 0)
                    .await
                {
                    Ok(readings) => {
                        // Oldest unseen first so the display stays chronological
                        for reading in readings.into_iter().rev() {
                            if reading.udi > last_udi {
                                last_udi = reading.udi;
                                let _ = events
                                    .try_send(ClientEvent::ReadingReceived(Arc::new(reading)));
                            }
                        }
                    }
                    Err(e) => error!("Polling sensors failed: {}", e),
                }
            }
        }
    }
    Ok(())
}

async fn run_simulator(
    config: &Config,
    api: Arc<ApiClient>,
    store: Arc<StateStore>,
    command: &SimulatorCommand,
) -> Result<()> {
    let controller = SimulatorController::new(api, store, config.simulator.anomaly_period);

    match command {
        SimulatorCommand::Start => {
            controller.start_normal().await?;
            println!("Simulator started (normal mode)");
        }
        SimulatorCommand::Anomaly { machine_id } => {
            controller.start_anomaly(machine_id).await?;
            println!(
                "Anomaly injection running for {} (re-sent every {}s). \
                 Ctrl+C stops the local timer; run `simulator stop` to halt the server.",
                machine_id,
                config.simulator.anomaly_period.as_secs()
            );
            tokio::signal::ctrl_c().await?;
            println!();
            info!("Anomaly injection timer stopped");
        }
        SimulatorCommand::Stop => {
            controller.stop().await?;
            println!("Simulator stopped");
        }
    }

    Ok(())
}

async fn run_predict(api: &ApiClient, machine_id: &str, colored: bool) -> Result<()> {
    let machine = api.machine(machine_id).await?;
    let readings = api
        .sensor_readings(machine_id, READING_BUFFER_CAPACITY as u32, 0)
        .await?;

    let Some(latest) = readings.first() else {
        anyhow::bail!(
            "No sensor data available for {machine_id} - start the simulator to generate readings"
        );
    };

    let request = PredictionRequest::from_reading(&machine.machine_type, latest);
    info!(
        "Requesting prediction for {} using reading udi={}",
        machine_id, latest.udi
    );
    let prediction = api.predict(&request).await?;
    print_prediction(&prediction, colored);
    Ok(())
}
