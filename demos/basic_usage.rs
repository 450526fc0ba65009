//! Minimal end-to-end walkthrough: seed a rule document into an in-memory
//! driver, start the engine, calculate against a couple of payloads, and
//! watch a hot-reload take effect.

use rule_engine::driver::MemoryDriver;
use rule_engine::engine::Engine;
use rule_engine::value::Payload;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let driver = MemoryDriver::new();
    driver.seed(
        "/rule/discount",
        br#"
style: advanced
rule:
  - if: plan == "pro"
    then:
      pct: 20
  - if: plan == "basic"
    then:
      pct: 5
  - if: "true"
    then:
      pct: 0
"#
        .to_vec(),
    );

    let (engine, handle) = Engine::start(driver.clone()).await?;
    println!("{} rule(s) loaded", engine.count());

    for plan in ["pro", "basic", "free"] {
        let payload = Payload::from_pairs([("plan", Value::from(plan))]);
        let result = engine.of("/rule/discount").payload(&payload)?;
        println!("plan={plan} -> discount={}%", result.int("pct"));
    }

    // Replace the document; the background watch task picks it up since the
    // key already exists in the cache.
    driver.put(
        "/rule/discount",
        br#"
style: advanced
rule:
  - if: plan == "pro"
    then:
      pct: 30
  - if: "true"
    then:
      pct: 0
"#
        .to_vec(),
    );
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let payload = Payload::from_pairs([("plan", Value::from("pro"))]);
    let result = engine.of("/rule/discount").payload(&payload)?;
    println!("after hot reload, plan=pro -> discount={}%", result.int("pct"));

    handle.shutdown().await.ok();
    Ok(())
}
