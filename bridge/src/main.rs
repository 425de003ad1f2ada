mod ack;
mod broker;
mod capability;
mod host;
mod options;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
