// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    admissions: IntCounterVec,
    links: IntCounterVec,
    sweeps: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("gated_relay".to_string()), None)?;

        let admissions = IntCounterVec::new(
            Opts::new("admissions_total", "Admission gate decisions by outcome"),
            &["outcome"],
        )?;
        let links = IntCounterVec::new(
            Opts::new("links_total", "Processed links by outcome"),
            &["outcome"],
        )?;
        let sweeps = IntCounterVec::new(
            Opts::new("sweeps_total", "Background sweeper iterations"),
            &["sweeper", "result"],
        )?;

        registry.register(Box::new(admissions.clone()))?;
        registry.register(Box::new(links.clone()))?;
        registry.register(Box::new(sweeps.clone()))?;

        Ok(Self {
            registry,
            admissions,
            links,
            sweeps,
        })
    }

    /// `outcome` is `allowed` or a denial code.
    pub fn record_admission(&self, outcome: &str) {
        self.admissions.with_label_values(&[outcome]).inc();
    }

    /// `outcome` is `delivered` or a job error code.
    pub fn record_link(&self, outcome: &str) {
        self.links.with_label_values(&[outcome]).inc();
    }

    pub fn record_sweep(&self, sweeper: &str, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.sweeps.with_label_values(&[sweeper, result]).inc();
    }

    /// Text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
