use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::ledger::UsageRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_tokens: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
    pub average_tokens_per_call: f64,
    pub average_cost_per_call: f64,
    pub top_countries: BTreeMap<String, u64>,
    pub calls_by_day: BTreeMap<String, u64>,
    pub cost_by_day: BTreeMap<String, f64>,
    pub errors_by_category: BTreeMap<String, u64>,
    pub skipped_records: u64,
}

impl StatsSnapshot {
    fn add(&mut self, record: &UsageRecord) {
        self.total_calls += 1;
        if record.success {
            self.successful_calls += 1;
        } else {
            self.failed_calls += 1;
            if let Some(category) = &record.error {
                *self.errors_by_category.entry(category.clone()).or_default() += 1;
            }
        }

        self.total_tokens = self.total_tokens.saturating_add(record.total_tokens);
        self.total_input_tokens = self.total_input_tokens.saturating_add(record.input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(record.output_tokens);
        self.total_cost += record.cost_usd;

        if let Some(country) = &record.country {
            *self.top_countries.entry(country.clone()).or_default() += 1;
        }

        let day = record.timestamp.format("%Y-%m-%d").to_string();
        *self.cost_by_day.entry(day.clone()).or_default() += record.cost_usd;
        *self.calls_by_day.entry(day).or_default() += 1;
    }

    fn finish(mut self) -> Self {
        if self.total_calls > 0 {
            self.average_tokens_per_call = self.total_tokens as f64 / self.total_calls as f64;
            self.average_cost_per_call = self.total_cost / self.total_calls as f64;
        }
        self
    }
}

pub fn aggregate(ledger_path: &Path, lookback_days: u32) -> StatsSnapshot {
    aggregate_at(ledger_path, lookback_days, Utc::now())
}

// Roll up records with now - lookback_days <= timestamp <= now.
// A bad line only costs itself; a missing ledger is an empty snapshot.
pub fn aggregate_at(ledger_path: &Path, lookback_days: u32, now: DateTime<Utc>) -> StatsSnapshot {
    let cutoff = TimeDelta::try_days(i64::from(lookback_days))
        .and_then(|lookback| now.checked_sub_signed(lookback))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut snapshot = StatsSnapshot::default();

    let file = match File::open(ledger_path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return snapshot,
        Err(e) => {
            tracing::warn!(path = %ledger_path.display(), error = %e, "cannot open usage ledger");
            return snapshot;
        }
    };

    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %ledger_path.display(), error = %e, "usage ledger read aborted");
                break;
            }
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        // serde_json rejects invalid UTF-8 itself, no need to decode first
        let record: UsageRecord = match serde_json::from_slice(&line) {
            Ok(r) => r,
            Err(_) => {
                snapshot.skipped_records += 1;
                continue;
            }
        };

        if record.timestamp < cutoff || record.timestamp > now {
            continue;
        }
        snapshot.add(&record);
    }

    if snapshot.skipped_records > 0 {
        tracing::debug!(skipped = snapshot.skipped_records, "skipped malformed usage records");
    }

    snapshot.finish()
}
