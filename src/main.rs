use drogue_bazaar::runtime;
use state_waiter::run;

drogue_bazaar::project!("State Waiter");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runtime!(PROJECT).exec(run).await
}
