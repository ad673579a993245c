//! Notification Worker - Entry Point
//!
//! Background worker that delivers notification emails from the Redis stream.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    courier_notification_worker::run().await
}
