//! Natural-language insight via an external text-generation service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UpstreamFailure;
use crate::types::{ProcessInfo, SystemData};

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamFailure>;
}

/// Generate, folding any failure into displayable `"Error: ..."` text.
pub async fn generate_text(generator: &dyn TextGenerator, prompt: &str) -> String {
    match generator.generate(prompt).await {
        Ok(text) => text,
        Err(e) => e.to_string(),
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Pull `candidates[0].content.parts[0].text` out of a raw reply body.
pub fn extract_text(body: &str) -> Option<String> {
    let parsed: GenerateResponse = serde_json::from_str(body).ok()?;
    parsed
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}

/// Client for a Gemini-style `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamFailure> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| UpstreamFailure("no API key configured (SYSGLANCE_GENAI_API_KEY)".into()))?;

        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };
        debug!(prompt_len = prompt.len(), "sending generation request");

        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamFailure(format!("calling generation service: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| UpstreamFailure(format!("reading generation reply: {e}")))?;
        if !status.is_success() {
            return Err(UpstreamFailure(format!("{status}: {text}")));
        }
        extract_text(&text).ok_or(UpstreamFailure(text))
    }
}

pub fn process_behaviour_prompt(p: &ProcessInfo) -> String {
    format!(
        "Analyze this process data and provide insights:\n\
         Process: {}\n\
         CPU Usage: {}%\n\
         Memory Usage: {}%\n\
         Threads: {}\n\
         Start Time: {}\n\n\
         Provide:\n\
         1. Resource usage analysis\n\
         2. Potential performance issues\n\
         3. Recommendations for optimization\n",
        p.name,
        p.cpu_percent,
        p.memory_percent,
        threads_label(p),
        p.start_time
    )
}

pub fn anomaly_prompt(p: &ProcessInfo) -> String {
    format!(
        "Analyze this process for anomalies:\n\
         Process: {}\n\
         CPU Usage: {}%\n\
         Memory Usage: {}%\n\
         Threads: {}\n\n\
         Identify if this behavior is normal or anomalous.\n",
        p.name,
        p.cpu_percent,
        p.memory_percent,
        threads_label(p)
    )
}

pub fn recommendation_prompt(p: &ProcessInfo) -> String {
    format!(
        "Provide recommendations for this process:\n\
         Process: {}\n\
         CPU Usage: {}%\n\
         Memory Usage: {}%\n\
         Threads: {}\n\n\
         Suggest:\n\
         1. Priority adjustments\n\
         2. Resource optimization\n\
         3. Potential issues to watch for\n",
        p.name,
        p.cpu_percent,
        p.memory_percent,
        threads_label(p)
    )
}

fn threads_label(p: &ProcessInfo) -> String {
    p.thread_count
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".into())
}

pub fn system_prompt(d: &SystemData) -> String {
    let top_cpu = d
        .top_cpu_processes
        .iter()
        .map(|p| format!("{} ({:.1}%)", p.name, p.cpu_percent))
        .collect::<Vec<_>>()
        .join(", ");
    let top_mem = d
        .top_memory_processes
        .iter()
        .map(|p| format!("{} ({:.1}%)", p.name, p.memory_percent))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Analyze this system data and provide insights:\n\n\
         System Metrics:\n\
         - CPU Usage: {:.1}%\n\
         - Memory Usage: {:.1}%\n\
         - Disk Usage: {:.1}%\n\
         - Network: {} bytes sent, {} bytes received\n\n\
         Top CPU Processes:\n{top_cpu}\n\n\
         Top Memory Processes:\n{top_mem}\n\n\
         Provide:\n\
         1. Overall system health assessment\n\
         2. Resource usage analysis\n\
         3. Potential performance bottlenecks\n\
         4. Recommendations for optimization\n\
         5. Security considerations\n",
        d.cpu_percent, d.memory_percent, d.disk_percent, d.network_bytes_sent, d.network_bytes_recv
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_candidate_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"all good"}]}}]}"#;
        assert_eq!(extract_text(body).as_deref(), Some("all good"));
    }

    #[test]
    fn malformed_replies_yield_nothing() {
        assert_eq!(extract_text("not json"), None);
        assert_eq!(extract_text(r#"{"candidates":[]}"#), None);
        assert_eq!(extract_text(r#"{"candidates":[{"content":{"parts":[{}]}}]}"#), None);
        assert_eq!(extract_text(r#"{"promptFeedback":{}}"#), None);
    }

    #[test]
    fn system_prompt_lists_top_processes() {
        let d = SystemData {
            cpu_percent: 42.0,
            memory_percent: 55.55,
            disk_percent: 70.0,
            network_bytes_sent: 10,
            network_bytes_recv: 20,
            top_cpu_processes: vec![crate::types::TopCpuProcess {
                pid: 1,
                name: "init".into(),
                cpu_percent: 3.0,
            }],
            top_memory_processes: vec![],
        };
        let prompt = system_prompt(&d);
        assert!(prompt.contains("- CPU Usage: 42.0%"));
        assert!(prompt.contains("init (3.0%)"));
        assert!(prompt.contains("10 bytes sent, 20 bytes received"));
    }
}
