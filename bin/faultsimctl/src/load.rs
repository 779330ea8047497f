//! ---
//! fsim_section: "05-networking-external-interfaces"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Load generation with weighted virtual-user tasks."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::Duration;

use anyhow::{Context, Result};
use faultsim_inject::{FailureConfigPatch, Probability};
use futures::future::join_all;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, info};

/// One action a virtual user can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Task {
    GetData,
    ConfigureFailures,
}

impl Task {
    const ALL: [Task; 2] = [Task::GetData, Task::ConfigureFailures];

    fn weight(&self) -> u32 {
        match self {
            Task::GetData => 1,
            Task::ConfigureFailures => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Task::GetData => "GET /api/data",
            Task::ConfigureFailures => "POST /configure-failures",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadProfile {
    pub users: usize,
    pub duration: Duration,
    /// Think time between two tasks of one user, in seconds.
    pub wait_seconds: RangeInclusive<f64>,
    pub request_timeout: Duration,
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self {
            users: 10,
            duration: Duration::from_secs(60),
            wait_seconds: 0.5..=2.0,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Failure mix posted by the configure task.
pub fn failure_mix() -> Result<FailureConfigPatch> {
    Ok(FailureConfigPatch {
        error_rate: Some(Probability::new(0.2)?),
        slow_db_prob: Some(Probability::new(0.3)?),
        ext_api_fail_prob: Some(Probability::new(0.2)?),
        timeout_prob: Some(Probability::new(0.1)?),
    })
}

/// Responses per task and outcome (status code or `transport-error`).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tally {
    counts: BTreeMap<(Task, String), u64>,
}

impl Tally {
    pub fn record(&mut self, task: Task, outcome: impl Into<String>) {
        *self.counts.entry((task, outcome.into())).or_default() += 1;
    }

    pub fn merge(&mut self, other: Tally) {
        for (key, count) in other.counts {
            *self.counts.entry(key).or_default() += count;
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn count(&self, task: Task) -> u64 {
        self.counts
            .iter()
            .filter(|((t, _), _)| *t == task)
            .map(|(_, count)| count)
            .sum()
    }

    pub fn render(&self) -> String {
        let row = |task: &str, outcome: &str, count: &dyn std::fmt::Display| {
            format!("{task:<28} {outcome:<16} {count:>8}\n")
        };
        let mut out = row("task", "outcome", &"count");
        for ((task, outcome), count) in &self.counts {
            out.push_str(&row(task.label(), outcome, count));
        }
        out.push_str(&row("total", "", &self.total()));
        out
    }
}

/// Run `profile.users` concurrent users against `target` until the duration elapses.
pub async fn run(target: &str, profile: &LoadProfile) -> Result<Tally> {
    let client = Client::builder()
        .timeout(profile.request_timeout)
        .build()
        .context("failed to build http client")?;
    let body = failure_mix()?;
    let chooser = WeightedIndex::new(Task::ALL.iter().map(Task::weight))
        .context("invalid task weights")?;
    let deadline = Instant::now() + profile.duration;
    info!(users = profile.users, duration_s = profile.duration.as_secs(), target, "load started");

    let users = (0..profile.users).map(|user| {
        let client = client.clone();
        let chooser = chooser.clone();
        let wait = profile.wait_seconds.clone();
        async move {
            let mut rng = StdRng::from_entropy();
            let mut tally = Tally::default();
            loop {
                let pause = Duration::from_secs_f64(rng.gen_range(wait.clone()));
                if Instant::now() + pause >= deadline {
                    break;
                }
                tokio::time::sleep(pause).await;
                let task = Task::ALL[chooser.sample(&mut rng)];
                let outcome = execute(&client, target, task, &body).await;
                debug!(user, task = task.label(), outcome = %outcome, "task finished");
                tally.record(task, outcome);
            }
            tally
        }
    });

    let mut total = Tally::default();
    for tally in join_all(users).await {
        total.merge(tally);
    }
    info!(requests = total.total(), "load finished");
    Ok(total)
}

async fn execute(client: &Client, target: &str, task: Task, body: &FailureConfigPatch) -> String {
    let request = match task {
        Task::GetData => client.get(format!("{target}/api/data")),
        Task::ConfigureFailures => client
            .post(format!("{target}/configure-failures"))
            .json(body),
    };
    match request.send().await {
        Ok(response) => response.status().as_u16().to_string(),
        Err(_) => "transport-error".to_owned(),
    }
}
