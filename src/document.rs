//! Loads a rule document from raw YAML bytes and runs its self-contained
//! admission checks: the embedded `tests:` harness and `def:` JSON-Schema.
//! Mirrors the source's `NewRules`/`ValidateRules` pair, minus the external
//! `koanf` dependency -- this crate normalizes straight to `serde_json::Value`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::RuleError;
use crate::expr::{self, CompileFn};
use crate::rule::Ruler;
use crate::value::{normalize, Data, Payload};

/// Parse and strictly compile a rule document.
pub fn load_ruler(src: &[u8]) -> Result<Ruler, RuleError> {
    let mut ruler = Ruler::from_yaml(src)?;
    ruler.compile()?;
    Ok(ruler)
}

/// Parse a rule document and compile it with a caller-supplied compile
/// function (e.g. a permissive one that tolerates payload fields the
/// document's `if`/`case` expressions reference but a test payload omits).
pub fn load_ruler_with(src: &[u8], compile_fn: &CompileFn) -> Result<Ruler, RuleError> {
    let mut ruler = Ruler::from_yaml(src)?;
    ruler.compile_with(compile_fn)?;
    Ok(ruler)
}

/// Parse, compile, and run the admission checks a rule document declares
/// about itself: its embedded `tests:` assertions and its `def:` JSON-Schema.
/// Either block is optional; a document with neither always passes.
pub fn validate_rules(src: &[u8]) -> Result<(), RuleError> {
    let raw: serde_yaml::Value = serde_yaml::from_slice(src)?;
    let doc = normalize(raw);
    let mut ruler = Ruler::from_document(&doc)?;
    ruler.compile()?;
    run_tests(&ruler, &doc)?;
    run_schema_validation(&ruler, &doc)?;
    Ok(())
}

fn run_tests(ruler: &Ruler, doc: &Value) -> Result<(), RuleError> {
    let Some(tests_value) = doc.get("tests") else {
        return Ok(());
    };
    let cases: Vec<TestCase> = serde_json::from_value(tests_value.clone())?;
    for (index, case) in cases.iter().enumerate() {
        case.assert(ruler)
            .map_err(|reason| RuleError::TestFailed { index, reason })?;
    }
    Ok(())
}

fn run_schema_validation(ruler: &Ruler, doc: &Value) -> Result<(), RuleError> {
    let Some(def) = doc.get("def") else {
        return Ok(());
    };
    let validator =
        jsonschema::validator_for(def).map_err(|e| RuleError::SchemaInvalidDefinition(e.to_string()))?;
    ruler.validate_with_schema(&validator)
}

/// The HTTP-request-shaped fixture a test case builds its payload from.
#[derive(Debug, Clone, Deserialize)]
struct Given {
    #[serde(default)]
    method: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    body: String,
}

/// One embedded assertion: decode `given` into a payload, calculate the
/// rule, then check `expect` holds against the calculated result.
#[derive(Debug, Clone, Deserialize)]
struct TestCase {
    #[serde(default)]
    given: Given,
    #[serde(default = "default_expect")]
    expect: String,
}

fn default_expect() -> String {
    "true".to_string()
}

impl TestCase {
    fn assert(&self, ruler: &Ruler) -> Result<(), String> {
        let payload = decode_payload(&self.given)?;
        let data = ruler.calculate(&payload).map_err(|e| e.to_string())?;

        let program = expr::compile(&self.expect).map_err(|e| e.to_string())?;
        let result_env = Payload(data);
        let output = expr::run(&program, &result_env).map_err(|e| e.to_string())?;

        match output {
            Value::Bool(true) => Ok(()),
            Value::Bool(false) => Err(format!(
                "given {:?}, expects {:?} to be true, but it is false",
                self.given, self.expect
            )),
            other => Err(format!("\"expect\" should evaluate to a boolean, got {other:?}")),
        }
    }
}

/// A minimal GET-querystring / POST-JSON-body decoder, standing in for the
/// HTTP framework a real caller would front this crate with. Only what a
/// `tests:` fixture needs: turn `given.url`/`given.body` into a flat payload.
fn decode_payload(given: &Given) -> Result<Payload, String> {
    if given.method.eq_ignore_ascii_case("POST") {
        let data: Data = if given.body.trim().is_empty() {
            Data::new()
        } else {
            serde_json::from_str(&given.body).map_err(|e| e.to_string())?
        };
        return Ok(Payload(data));
    }

    let query = given.url.split_once('?').map_or("", |(_, q)| q);
    let mut data = Data::new();
    for pair in query.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        data.insert(percent_decode(key), Value::String(percent_decode(value)));
    }
    Ok(Payload(data))
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC_DOC: &[u8] = br#"
style: basic
rule:
  greeting: hello
tests:
  - given:
      url: "http://example.test/"
    expect: 'greeting == "hello"'
"#;

    const FAILING_DOC: &[u8] = br#"
style: basic
rule:
  greeting: hello
tests:
  - given:
      url: "http://example.test/"
    expect: 'greeting == "goodbye"'
"#;

    const ADVANCED_WITH_QUERY_TEST: &[u8] = br#"
style: advanced
rule:
  - if: plan == "pro"
    then:
      limit: 100
  - if: "true"
    then:
      limit: 10
tests:
  - given:
      url: "http://example.test/?plan=pro"
    expect: "limit == 100"
"#;

    const SCHEMA_DOC: &[u8] = br#"
style: basic
rule:
  count: "not-a-number"
def:
  type: object
  properties:
    count:
      type: integer
  required: [count]
"#;

    #[test]
    fn validate_rules_passes_when_tests_hold() {
        assert!(validate_rules(BASIC_DOC).is_ok());
    }

    #[test]
    fn validate_rules_fails_when_a_test_assertion_is_false() {
        let err = validate_rules(FAILING_DOC).unwrap_err();
        assert!(matches!(err, RuleError::TestFailed { index: 0, .. }));
    }

    #[test]
    fn query_string_populates_the_test_payload() {
        assert!(validate_rules(ADVANCED_WITH_QUERY_TEST).is_ok());
    }

    #[test]
    fn schema_validation_catches_a_type_mismatch() {
        let err = validate_rules(SCHEMA_DOC).unwrap_err();
        assert!(matches!(err, RuleError::SchemaInvalid(_)));
    }

    #[test]
    fn percent_decode_handles_spaces_and_escapes() {
        assert_eq!(percent_decode("a+b%20c"), "a b c");
    }

    #[test]
    fn load_ruler_compiles_and_is_ready_to_calculate() {
        let ruler = load_ruler(BASIC_DOC).unwrap();
        let payload = Payload::default();
        assert_eq!(ruler.calculate(&payload).unwrap().get("greeting").unwrap(), "hello");
    }
}
