//! End-to-end coverage of the engine facade: startup snapshot, payload
//! calculation, hot reload, regex filtering, and the update-only watch
//! semantics.

use rule_engine::driver::MemoryDriver;
use rule_engine::engine::Engine;
use rule_engine::value::Payload;
use rule_engine::EngineError;
use serde_json::Value;

fn payload(pairs: &[(&str, Value)]) -> Payload {
    Payload::from_pairs(pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())))
}

#[tokio::test]
async fn advanced_rule_picks_first_matching_branch() {
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

    let (engine, handle) = Engine::start(driver).await.unwrap();

    let pro = engine.of("/rule/discount").payload(&payload(&[("plan", Value::from("pro"))])).unwrap();
    assert_eq!(pro.int("pct"), 20);

    let basic = engine.of("/rule/discount").payload(&payload(&[("plan", Value::from("basic"))])).unwrap();
    assert_eq!(basic.int("pct"), 5);

    let free = engine.of("/rule/discount").payload(&payload(&[("plan", Value::from("free"))])).unwrap();
    assert_eq!(free.int("pct"), 0);

    assert!(matches!(handle.shutdown().await, Err(EngineError::Cancelled)));
}

#[tokio::test]
async fn switch_rule_dispatches_on_field_and_falls_back_to_default() {
    let driver = MemoryDriver::new();
    driver.seed(
        "/rule/region",
        br#"
style: switch
by: region
rule:
  - case: us
    style: basic
    rule:
      tax: 7
  - case: eu
    style: basic
    rule:
      tax: 20
default:
  style: basic
  rule:
    tax: 0
"#
        .to_vec(),
    );

    let (engine, handle) = Engine::start(driver).await.unwrap();

    let us = engine.of("/rule/region").payload(&payload(&[("region", Value::from("us"))])).unwrap();
    assert_eq!(us.int("tax"), 7);

    let unknown = engine.of("/rule/region").payload(&payload(&[("region", Value::from("mars"))])).unwrap();
    assert_eq!(unknown.int("tax"), 0);

    assert!(matches!(handle.shutdown().await, Err(EngineError::Cancelled)));
}

#[tokio::test]
async fn hot_reload_replaces_an_already_cached_rule() {
    let driver = MemoryDriver::new();
    driver.seed(
        "/rule/discount",
        br#"
style: advanced
rule:
  - if: "true"
    then:
      pct: 10
"#
        .to_vec(),
    );

    let (engine, handle) = Engine::start(driver.clone()).await.unwrap();
    let before = engine.of("/rule/discount").payload(&Payload::default()).unwrap();
    assert_eq!(before.int("pct"), 10);

    driver.put(
        "/rule/discount",
        br#"
style: advanced
rule:
  - if: "true"
    then:
      pct: 35
"#
        .to_vec(),
    );

    for _ in 0..20 {
        let after = engine.of("/rule/discount").payload(&Payload::default()).unwrap();
        if after.int("pct") == 35 {
            assert!(matches!(handle.shutdown().await, Err(EngineError::Cancelled)));
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("hot reload did not take effect within the polling window");
}

#[tokio::test]
async fn delete_event_removes_a_cached_rule_even_outside_the_key_filter() {
    let driver = MemoryDriver::new();
    driver.seed("/rule/a", b"style: basic\nrule:\n  ok: true\n".to_vec());

    let (engine, handle) = Engine::start(driver.clone()).await.unwrap();
    assert_eq!(engine.count(), 1);

    driver.delete("/rule/a");

    for _ in 0..20 {
        if engine.count() == 0 {
            assert!(matches!(handle.shutdown().await, Err(EngineError::Cancelled)));
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("delete event was not applied within the polling window");
}

#[tokio::test]
async fn watch_event_for_a_brand_new_key_is_ignored() {
    let driver = MemoryDriver::new();
    let (engine, handle) = Engine::start(driver.clone()).await.unwrap();
    assert_eq!(engine.count(), 0);

    driver.put("/rule/new", b"style: basic\nrule:\n  ok: true\n".to_vec());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(engine.count(), 0, "a key absent from the startup snapshot must not be admitted by a watch event");
    assert!(matches!(handle.shutdown().await, Err(EngineError::Cancelled)));
}

#[tokio::test]
async fn unknown_rule_name_reports_not_found() {
    let driver = MemoryDriver::new();
    let (engine, handle) = Engine::start(driver).await.unwrap();
    let err = engine.of("/rule/missing").payload(&Payload::default()).unwrap_err();
    assert!(matches!(err, EngineError::NotFound(name) if name == "/rule/missing"));
    assert!(matches!(handle.shutdown().await, Err(EngineError::Cancelled)));
}
