// Append-only usage ledger, one JSON object per line

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::client_id::ClientKey;
use crate::error::LedgerError;
use crate::metrics::{LEDGER_FAILURES, RECORDED_COST};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Url,
    Text,
}

impl InputType {
    // Same heuristic the frontend uses to pick its loading message
    pub fn detect(input: &str) -> Self {
        let input = input.trim();
        if input.starts_with("http") || input.starts_with("www.") {
            InputType::Url
        } else {
            InputType::Text
        }
    }
}

// One completed upstream call. Field names are the on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    pub model: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<InputType>,
}

impl UsageRecord {
    // Record stamped now, with totals and cost filled in
    pub fn new(
        client: &ClientKey,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        pricing: &Pricing,
        success: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            client_id: client.to_string(),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            cost_usd: cost(input_tokens, output_tokens, pricing),
            model: model.to_string(),
            success,
            error: None,
            recipe_name: None,
            ingredient_count: None,
            country: None,
            input_type: None,
        }
    }
}

// USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

// Model id -> pricing, with a fallback for models we have no entry for
#[derive(Debug, Clone)]
pub struct PricingTable {
    fallback: Pricing,
    models: HashMap<String, Pricing>,
}

impl PricingTable {
    pub fn new(fallback: Pricing) -> Self {
        Self {
            fallback,
            models: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model: &str, pricing: Pricing) -> Self {
        self.models.insert(model.to_string(), pricing);
        self
    }

    pub fn for_model(&self, model: &str) -> Pricing {
        self.models.get(model).copied().unwrap_or(self.fallback)
    }
}

pub fn cost(input_tokens: u64, output_tokens: u64, pricing: &Pricing) -> f64 {
    let input_cost = (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million;
    let output_cost = (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million;
    input_cost + output_cost
}

pub struct UsageLedger {
    path: PathBuf,
    writer: Mutex<()>,
}

impl UsageLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Best-effort: failures are logged and counted, never returned
    pub fn append(&self, record: &UsageRecord) {
        match self.try_append(record) {
            Ok(()) => RECORDED_COST.inc_by(record.cost_usd),
            Err(e) => {
                LEDGER_FAILURES.inc();
                tracing::error!(path = %self.path.display(), error = %e, "failed to log usage");
            }
        }
    }

    pub fn try_append(&self, record: &UsageRecord) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        // Guards no data, so a panic in another writer leaves nothing to repair
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        // A torn last line would swallow this record; start on a fresh line instead
        if !ends_with_newline(&mut file)? {
            line.insert(0, '\n');
        }

        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

// True for an empty file too
fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const MINI: Pricing = Pricing {
        input_per_million: 0.15,
        output_per_million: 0.60,
    };

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn record(client: &str) -> UsageRecord {
        UsageRecord::new(
            &ClientKey::from_address(client),
            "gpt-4o-mini",
            1200,
            300,
            &MINI,
            true,
        )
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(cost(0, 0, &MINI), 0.0);
    }

    #[test]
    fn cost_matches_per_million_pricing() {
        assert!(close(cost(1_000_000, 0, &MINI), 0.15));
        assert!(close(cost(0, 1_000_000, &MINI), 0.60));
        assert!(close(cost(2_000, 500, &MINI), 0.0003 + 0.0003));
    }

    #[test]
    fn cost_is_additive() {
        let (a, b, c, d) = (1234, 5678, 910, 1112);
        let whole = cost(a + b, c + d, &MINI);
        let parts = cost(a, c, &MINI) + cost(b, d, &MINI);
        assert!(close(whole, parts));
    }

    #[test]
    fn pricing_table_falls_back() {
        let table = PricingTable::new(MINI).with_model(
            "gpt-4o",
            Pricing {
                input_per_million: 2.5,
                output_per_million: 10.0,
            },
        );
        assert_eq!(table.for_model("gpt-4o").input_per_million, 2.5);
        assert_eq!(table.for_model("something-else"), MINI);
    }

    #[test]
    fn input_type_detection() {
        assert_eq!(InputType::detect("  https://example.com/pie"), InputType::Url);
        assert_eq!(InputType::detect("www.example.com"), InputType::Url);
        assert_eq!(InputType::detect("2 cups flour\n1 egg"), InputType::Text);
    }

    #[test]
    fn record_serializes_with_wire_field_names() {
        let mut rec = record("1.2.3.4");
        rec.country = Some("US".to_string());
        rec.input_type = Some(InputType::Url);
        let json: serde_json::Value = serde_json::to_value(&rec).unwrap();

        for field in [
            "timestamp",
            "clientId",
            "inputTokens",
            "outputTokens",
            "totalTokens",
            "costUSD",
            "model",
            "success",
            "country",
            "inputType",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["inputType"], "url");
        assert_eq!(json["totalTokens"], 1500);
        assert!(json.get("error").is_none());
        assert!(json.get("recipeName").is_none());
    }

    #[test]
    fn token_total_saturates() {
        let rec = UsageRecord::new(
            &ClientKey::from_address("e"),
            "gpt-4o-mini",
            u64::MAX,
            1,
            &MINI,
            true,
        );
        assert_eq!(rec.total_tokens, u64::MAX);
        assert!(rec.cost_usd.is_finite());
    }

    #[test]
    fn keeps_writing_after_a_writer_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(UsageLedger::new(dir.path().join("api_usage.log")));

        let poisoner = Arc::clone(&ledger);
        let _ = thread::spawn(move || {
            let _guard = poisoner.writer.lock().unwrap();
            panic!("writer died mid-append");
        })
        .join();
        assert!(ledger.writer.is_poisoned());

        ledger.try_append(&record("f")).unwrap();
        let contents = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = UsageLedger::new(dir.path().join("logs").join("api_usage.log"));

        ledger.append(&record("a"));
        ledger.append(&record("b"));

        let contents = fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: UsageRecord = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.total_tokens, 1500);
        }
    }

    #[test]
    fn torn_tail_does_not_swallow_next_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_usage.log");
        fs::write(&path, "{\"timestamp\":\"2025-01-01T00:00:00Z\",\"clie").unwrap();

        let ledger = UsageLedger::new(&path);
        ledger.try_append(&record("c")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(serde_json::from_str::<UsageRecord>(lines[0]).is_err());
        assert!(serde_json::from_str::<UsageRecord>(lines[1]).is_ok());
    }

    #[test]
    fn unwritable_ledger_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // The ledger path is a directory, so opening it for append fails
        let ledger = UsageLedger::new(dir.path());
        assert!(ledger.try_append(&record("d")).is_err());
        ledger.append(&record("d"));
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(UsageLedger::new(dir.path().join("api_usage.log")));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..25 {
                        let mut rec = record(&format!("{t}-{i}"));
                        rec.recipe_name = Some("x".repeat(512));
                        ledger.try_append(&rec).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let contents = fs::read_to_string(ledger.path()).unwrap();
        let parsed = contents
            .lines()
            .filter(|l| serde_json::from_str::<UsageRecord>(l).is_ok())
            .count();
        assert_eq!(parsed, 200);
    }
}
