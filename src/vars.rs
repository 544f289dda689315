//! Exported diagnostic variables.
//!
//! A [`Vars`] registry maps names to closures producing JSON values. The
//! debug layer renders the whole registry at `/debug/vars`, evaluating every
//! closure at request time, so values are always current.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::fds::FdUsage;
use crate::stats::Stats;

type VarFn = Box<dyn Fn() -> Value + Send + Sync + 'static>;

/// Registry of named, lazily evaluated JSON values.
#[derive(Default)]
pub struct Vars {
    vars: RwLock<BTreeMap<String, VarFn>>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the standard process vars:
    ///
    /// - `cmdline`: process arguments
    /// - `fds`: `{"Max", "Open"}` file descriptors
    /// - `http`: request/response counters and latency quantiles
    pub fn with_defaults(stats: Arc<Stats>) -> Self {
        let vars = Self::new();
        let mut map = vars.vars.write();
        map.insert("cmdline".into(), Box::new(|| Value::from(std::env::args().collect::<Vec<_>>())));
        map.insert("fds".into(), Box::new(|| to_value(FdUsage::current())));
        map.insert("http".into(), Box::new(move || to_value(stats.snapshot())));
        drop(map);
        vars
    }

    /// Publishes `name`. Names are unique for the lifetime of the registry.
    pub fn publish<F>(&self, name: impl Into<String>, var: F) -> Result<()>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        let mut map = self.vars.write();
        if map.contains_key(&name) {
            return Err(Error::DuplicateVar(name));
        }
        map.insert(name, Box::new(var));
        Ok(())
    }

    /// Evaluates a single var.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.read().get(name).map(|var| var())
    }

    pub fn names(&self) -> Vec<String> {
        self.vars.read().keys().cloned().collect()
    }

    /// Evaluates every var into one object, keys in sorted order.
    pub fn to_json(&self) -> Value {
        let map = self.vars.read();
        let mut out = Map::with_capacity(map.len());
        for (name, var) in map.iter() {
            out.insert(name.clone(), var());
        }
        Value::Object(out)
    }

    /// Pretty-printed [`to_json`](Self::to_json) followed by a newline.
    pub fn render(&self) -> Vec<u8> {
        let mut body = serde_json::to_vec_pretty(&self.to_json()).unwrap_or_else(|_| b"{}".to_vec());
        body.push(b'\n');
        body
    }
}

/// Serialisation of the crate's own snapshot types cannot fail; fall back to
/// `null` rather than poisoning the whole document if it ever does.
fn to_value<T: serde::Serialize>(v: T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::config::TrackerConfig;

    #[test]
    fn vars_are_evaluated_on_every_read() {
        let vars = Vars::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        vars.publish("hits", move || Value::from(counter.fetch_add(1, Ordering::Relaxed) + 1))
            .unwrap();

        assert_eq!(vars.get("hits"), Some(Value::from(1)));
        assert_eq!(vars.get("hits"), Some(Value::from(2)));
        assert_eq!(hits.load(Ordering::Relaxed), 2);
        assert_eq!(vars.get("missing"), None);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let vars = Vars::new();
        vars.publish("a", || Value::Null).unwrap();
        let err = vars.publish("a", || Value::Bool(true)).unwrap_err();
        assert!(matches!(err, Error::DuplicateVar(ref n) if n == "a"));
        assert_eq!(vars.get("a"), Some(Value::Null));
    }

    #[test]
    fn rendered_document_is_sorted_json() {
        let vars = Vars::new();
        vars.publish("zeta", || Value::from(1)).unwrap();
        vars.publish("alpha", || Value::from("x")).unwrap();

        let body = vars.render();
        assert_eq!(body.last(), Some(&b'\n'));
        let text = String::from_utf8(body).unwrap();
        assert!(text.find("alpha").unwrap() < text.find("zeta").unwrap());

        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, serde_json::json!({"alpha": "x", "zeta": 1}));
    }

    #[test]
    fn defaults_publish_process_vars() {
        let stats = Arc::new(Stats::new(TrackerConfig::default()).unwrap());
        stats.request_started();
        let vars = Vars::with_defaults(Arc::clone(&stats));

        assert_eq!(vars.names(), ["cmdline", "fds", "http"]);
        let http = vars.get("http").unwrap();
        assert_eq!(http["Requests"], 1);
        assert_eq!(http["Responses"], 0);
        assert_eq!(http["Latency"]["P999"], 0.0);
        assert!(vars.get("fds").unwrap().get("Open").is_some());
        assert!(vars.get("cmdline").unwrap().is_array());

        assert!(matches!(vars.publish("http", || Value::Null), Err(Error::DuplicateVar(_))));
    }
}
