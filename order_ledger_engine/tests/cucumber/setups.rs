use cucumber::given;
use order_ledger_engine::traits::GatewayError;

use crate::cucumber::{LedgerSystem, LedgerWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut LedgerWorld) {
    let system = LedgerSystem::new().await;
    world.system = Some(system);
}

#[given("the gateway will decline the next charge")]
async fn decline_next_charge(world: &mut LedgerWorld) {
    world.gateway().then_charge_error(GatewayError::Declined("insufficient funds".into()));
}

#[given("the gateway is unavailable")]
async fn gateway_unavailable(world: &mut LedgerWorld) {
    for _ in 0..3 {
        world.gateway().then_charge_error(GatewayError::Transient("503 Service Unavailable".into()));
    }
}

#[given("the gateway is too slow to answer")]
async fn gateway_too_slow(world: &mut LedgerWorld) {
    world.gateway().with_delay(std::time::Duration::from_millis(500));
}

#[given("the gateway will fail the next refund")]
async fn fail_next_refund(world: &mut LedgerWorld) {
    world.gateway().then_refund_error(GatewayError::Declined("card expired".into()));
}

#[given("the gateway answers promptly again")]
async fn gateway_prompt(world: &mut LedgerWorld) {
    world.gateway().with_delay(std::time::Duration::ZERO);
}
