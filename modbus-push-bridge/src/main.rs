//! Polls Modbus-TCP registers and pushes value changes to a chat webhook.

use anyhow::{Context, Result};
use modbus_push_bridge::{
    ConnectionManager, ModbusPushConfig, PollOptions, TcpConnector, WebhookNotifier,
    run_poll_loop,
};
use modbus_push_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("modbus-push.json5");

    let config = ModbusPushConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let mut runner = BridgeRunner::new_with_args("modbus-push", config, Some(&args))
        .context("Failed to start bridge")?;

    info!("Loaded configuration from {:?}", args.config);

    let config = runner.config().clone();
    let request = config
        .connect_request()
        .context("Invalid webhook configuration")?;

    let connector = TcpConnector::new(config.modbus.unit_id, config.modbus.timeout());
    let notifier =
        WebhookNotifier::new(config.webhook.timeout()).context("Failed to build HTTP client")?;
    let options = PollOptions {
        repeat_nonzero: config.modbus.repeat_nonzero,
    };

    let mut manager = ConnectionManager::new(connector, notifier, options);
    manager.connect(&request).await.with_context(|| {
        format!(
            "Failed to connect to {}:{}",
            config.modbus.host, config.modbus.port
        )
    })?;

    let shutdown = runner.shutdown_signal();
    let period = config.modbus.poll_interval();
    runner.spawn(async move {
        run_poll_loop(manager, period, shutdown).await;
    });

    runner.run().await?;

    Ok(())
}
