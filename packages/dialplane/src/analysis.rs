//! Post-call AI analysis.
//!
//! A true fire-and-forget task: spawned after the provider webhook has been
//! acked, it asks Claude for sentiment/topics/score over the transcript and
//! writes the result back onto the call record. It never blocks or fails the
//! webhook path, and voicemail recordings are never analyzed.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use dialplane_types::{CallAnalysis, CallRecord, CallStatus, Client, Sentiment};

use crate::app::App;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MODEL: &str = "claude-opus-5";

/// Transcripts are clipped before prompting; full transcripts stay on the
/// call record.
const PROMPT_TRANSCRIPT_MAX_CHARS: usize = 30_000;

/// Whether a finished call qualifies for analysis at all.
pub fn should_analyze(app: &Arc<App>, call: &CallRecord, client: Option<&Client>) -> bool {
    if app.config.anthropic_api_key.is_none() {
        return false;
    }
    if call.status != CallStatus::Completed || call.voicemail {
        return false;
    }
    if call.transcript.as_deref().map_or(true, str::is_empty) {
        return false;
    }
    // a client can opt out; calls not tied to a client follow the tenant
    match client {
        Some(client) => client.permissions.ai_analysis_enabled,
        None => true,
    }
}

pub fn spawn(app: Arc<App>, call: CallRecord) {
    tokio::spawn(async move {
        if let Err(err) = run(&app, &call).await {
            tracing::warn!(call_id = %call.id, error = %err, "call analysis failed");
        }
    });
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnalysisPayload {
    sentiment: String,
    #[serde(default)]
    topics: Vec<String>,
    score: u8,
    summary: String,
}

async fn run(app: &Arc<App>, call: &CallRecord) -> anyhow::Result<()> {
    let api_key = app
        .config
        .anthropic_api_key
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("analysis disabled: no api key"))?;

    // analysis shares the tenant's AI budget
    app.rate_limiter
        .check(call.tenant_id.as_ref(), app.clock.now())?;

    let transcript: String = call
        .transcript
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(PROMPT_TRANSCRIPT_MAX_CHARS)
        .collect();

    let prompt = format!(
        "Analyze this phone call transcript between an AI voice agent and a lead.\n\
         Respond with only a JSON object, no prose, shaped as:\n\
         {{\"sentiment\": \"positive|neutral|negative\", \"topics\": [\"...\"], \
         \"score\": 0-100, \"summary\": \"one or two sentences\"}}\n\n\
         Transcript:\n{}",
        transcript
    );

    let response = app
        .http_client
        .post(ANTHROPIC_API_URL)
        .header("x-api-key", api_key.as_str())
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&json!({
            "model": ANTHROPIC_MODEL,
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": prompt}],
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("analysis request returned {}", status.as_u16());
    }

    let body: MessagesResponse = response.json().await?;
    if body.stop_reason.as_deref() == Some("refusal") {
        anyhow::bail!("analysis request was refused");
    }
    let text = body
        .content
        .iter()
        .find(|block| block.kind == "text")
        .map(|block| block.text.as_str())
        .ok_or_else(|| anyhow::anyhow!("no text block in analysis response"))?;

    let parsed: AnalysisPayload = serde_json::from_str(text.trim())?;
    let analysis = CallAnalysis {
        sentiment: parse_sentiment(&parsed.sentiment),
        topics: parsed.topics,
        score: Some(parsed.score.min(100)),
        summary: Some(parsed.summary),
    };

    app.store.set_call_analysis(&call.id, analysis)?;
    tracing::debug!(call_id = %call.id, "call analysis stored");
    Ok(())
}

fn parse_sentiment(raw: &str) -> Option<Sentiment> {
    match raw.to_ascii_lowercase().as_str() {
        "positive" => Some(Sentiment::Positive),
        "neutral" => Some(Sentiment::Neutral),
        "negative" => Some(Sentiment::Negative),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_parsing_is_lenient() {
        assert_eq!(parse_sentiment("Positive"), Some(Sentiment::Positive));
        assert_eq!(parse_sentiment("NEGATIVE"), Some(Sentiment::Negative));
        assert_eq!(parse_sentiment("meh"), None);
    }
}
