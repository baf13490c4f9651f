// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CloudWatch Logs sink. Enforces, in the same units throughout
//! (`chrono::Duration`, not a mismatched seconds/nanoseconds comparison):
//! at most 10 000 events per batch, at most 1 048 576 bytes per batch (each
//! event counted with a 26-byte protocol overhead), and a batch time-span of
//! at most 24 hours. Events are sorted by creation time ascending before
//! batching, since the API requires non-decreasing timestamps within one
//! upload; the earliest prefix satisfying all three limits is sent and the
//! remainder is carried over to the next upload.
//!
//! On `InvalidSequenceTokenException` the sink re-fetches the token via
//! `describe_log_streams`. On `ResourceNotFoundException` it creates the
//! group and stream (an "already exists" response from either call counts
//! as success) and clears the token before retrying once.

use std::sync::Mutex;

use chrono::Duration;
use logship_core::Message;
use tracing::warn;

use crate::{error::Result, metrics::CLOUDWATCH_BATCH_SPLITS};

pub const MAX_EVENTS_PER_BATCH: usize = 10_000;
pub const MAX_BYTES_PER_BATCH: usize = 1_048_576;
pub const EVENT_OVERHEAD_BYTES: usize = 26;

fn max_batch_time_span() -> Duration { Duration::hours(24) }

/// Outcome of a `put_log_events` call the client needs the sink to react
/// to differently from a generic failure.
pub enum PutLogEventsOutcome {
    Accepted { next_sequence_token: Option<String> },
    InvalidSequenceToken,
    ResourceNotFound,
}

/// Thin seam over the CloudWatch Logs SDK client.
#[async_trait::async_trait]
pub trait CloudWatchClient: Send + Sync {
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        events: &[(i64, String)],
        sequence_token: Option<&str>,
    ) -> Result<PutLogEventsOutcome>;

    async fn describe_sequence_token(&self, group: &str, stream: &str) -> Result<Option<String>>;

    /// Creates the log group and stream if missing; an "already exists"
    /// response from either call is treated as success.
    async fn ensure_log_group_and_stream(&self, group: &str, stream: &str) -> Result<()>;
}

pub struct AwsCloudWatchClient {
    inner: aws_sdk_cloudwatchlogs::Client,
}

impl AwsCloudWatchClient {
    #[must_use]
    pub fn new(inner: aws_sdk_cloudwatchlogs::Client) -> Self { AwsCloudWatchClient { inner } }
}

#[async_trait::async_trait]
impl CloudWatchClient for AwsCloudWatchClient {
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        events: &[(i64, String)],
        sequence_token: Option<&str>,
    ) -> Result<PutLogEventsOutcome> {
        let input_events: Vec<_> = events
            .iter()
            .map(|(ts, msg)| aws_sdk_cloudwatchlogs::types::InputLogEvent::builder().timestamp(*ts).message(msg.clone()).build().expect("timestamp and message are always set"))
            .collect();
        let mut req = self.inner.put_log_events().log_group_name(group).log_stream_name(stream).set_log_events(Some(input_events));
        if let Some(token) = sequence_token {
            req = req.sequence_token(token);
        }
        match req.send().await {
            Ok(out) => Ok(PutLogEventsOutcome::Accepted { next_sequence_token: out.next_sequence_token().map(str::to_string) }),
            Err(e) => {
                if let Some(service_err) = e.as_service_error() {
                    if service_err.is_invalid_sequence_token_exception() {
                        return Ok(PutLogEventsOutcome::InvalidSequenceToken);
                    }
                    if service_err.is_resource_not_found_exception() {
                        return Ok(PutLogEventsOutcome::ResourceNotFound);
                    }
                }
                Err(crate::error::Error::CloudWatch { source: Box::new(e), loc: snafu::Location::new(file!(), line!(), column!()) })
            }
        }
    }

    async fn describe_sequence_token(&self, group: &str, stream: &str) -> Result<Option<String>> {
        let out = self
            .inner
            .describe_log_streams()
            .log_group_name(group)
            .log_stream_name_prefix(stream)
            .send()
            .await
            .map_err(|e| crate::error::Error::CloudWatch { source: Box::new(e), loc: snafu::Location::new(file!(), line!(), column!()) })?;
        Ok(out.log_streams().iter().find(|s| s.log_stream_name() == Some(stream)).and_then(|s| s.upload_sequence_token().map(str::to_string)))
    }

    async fn ensure_log_group_and_stream(&self, group: &str, stream: &str) -> Result<()> {
        let group_result = self.inner.create_log_group().log_group_name(group).send().await;
        if let Err(e) = group_result
            && !e.as_service_error().and_then(|se| se.code()).is_some_and(|c| c == "ResourceAlreadyExistsException")
        {
            return Err(crate::error::Error::CloudWatch { source: Box::new(e), loc: snafu::Location::new(file!(), line!(), column!()) });
        }
        let stream_result = self.inner.create_log_stream().log_group_name(group).log_stream_name(stream).send().await;
        if let Err(e) = stream_result
            && !e.as_service_error().and_then(|se| se.code()).is_some_and(|c| c == "ResourceAlreadyExistsException")
        {
            return Err(crate::error::Error::CloudWatch { source: Box::new(e), loc: snafu::Location::new(file!(), line!(), column!()) });
        }
        Ok(())
    }
}

/// Splits a time-sorted prefix of `messages` off the front that satisfies
/// all three CloudWatch batch limits, returning `(batch, remainder)`.
#[must_use]
pub fn split_batch(mut messages: Vec<Message>, stream: &str) -> (Vec<Message>, Vec<Message>) {
    messages.sort_by_key(Message::created_at);

    let mut taken = Vec::new();
    let mut bytes = 0usize;
    let mut earliest = None;
    let mut split = false;

    let mut iter = messages.into_iter();
    while let Some(msg) = iter.next() {
        if taken.len() >= MAX_EVENTS_PER_BATCH {
            split = true;
            taken.push(msg);
            break;
        }
        let event_bytes = msg.len() + EVENT_OVERHEAD_BYTES;
        if bytes + event_bytes > MAX_BYTES_PER_BATCH {
            split = true;
            taken.push(msg);
            break;
        }
        let ts = msg.created_at();
        let span_start = *earliest.get_or_insert(ts);
        if ts.signed_duration_since(span_start) > max_batch_time_span() {
            split = true;
            taken.push(msg);
            break;
        }
        bytes += event_bytes;
        taken.push(msg);
    }
    let rest: Vec<Message> = iter.collect();
    let rest = {
        let mut rest = rest;
        if split {
            // the message that tripped a limit belongs to the remainder, not
            // the batch that was just closed.
            if let Some(overflow) = taken.pop() {
                rest.insert(0, overflow);
            }
            CLOUDWATCH_BATCH_SPLITS.with_label_values(&[stream]).inc();
        }
        rest
    };
    (taken, rest)
}

pub struct CloudWatchSinkConfig {
    pub log_group: String,
    pub log_stream: String,
}

pub struct CloudWatchSink<C: CloudWatchClient> {
    name: String,
    client: C,
    cfg: CloudWatchSinkConfig,
    sequence_token: Mutex<Option<String>>,
}

impl<C: CloudWatchClient> CloudWatchSink<C> {
    pub fn new(name: impl Into<String>, client: C, cfg: CloudWatchSinkConfig) -> Self {
        CloudWatchSink { name: name.into(), client, cfg, sequence_token: Mutex::new(None) }
    }

    /// Uploads the earliest valid prefix of `messages`, returning whatever
    /// didn't fit for the caller to retry on the next flush.
    pub async fn upload(&self, messages: Vec<Message>, fallback: impl Fn(&Message)) -> Vec<Message> {
        let (batch, rest) = split_batch(messages, &self.cfg.log_stream);
        if batch.is_empty() {
            return rest;
        }
        let events: Vec<(i64, String)> =
            batch.iter().map(|m| (m.created_at().timestamp_millis(), String::from_utf8_lossy(m.payload()).into_owned())).collect();

        let token = self.sequence_token.lock().unwrap().clone();
        match self.client.put_log_events(&self.cfg.log_group, &self.cfg.log_stream, &events, token.as_deref()).await {
            Ok(PutLogEventsOutcome::Accepted { next_sequence_token }) => {
                *self.sequence_token.lock().unwrap() = next_sequence_token;
            }
            Ok(PutLogEventsOutcome::InvalidSequenceToken) => {
                match self.client.describe_sequence_token(&self.cfg.log_group, &self.cfg.log_stream).await {
                    Ok(fresh) => *self.sequence_token.lock().unwrap() = fresh,
                    Err(e) => warn!(sink = %self.name, error = %e, "failed to refresh cloudwatch sequence token"),
                }
                for m in &batch {
                    fallback(m);
                }
            }
            Ok(PutLogEventsOutcome::ResourceNotFound) => {
                if let Err(e) = self.client.ensure_log_group_and_stream(&self.cfg.log_group, &self.cfg.log_stream).await {
                    warn!(sink = %self.name, error = %e, "failed to create cloudwatch log group/stream");
                }
                *self.sequence_token.lock().unwrap() = None;
                for m in &batch {
                    fallback(m);
                }
            }
            Err(e) => {
                warn!(sink = %self.name, error = %e, "cloudwatch put_log_events failed");
                for m in &batch {
                    fallback(m);
                }
            }
        }
        rest
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use logship_core::StreamId;
    use test_case::test_case;

    use super::*;

    fn msg_at(payload: &'static [u8], millis_offset: i64) -> Message {
        let m = Message::new(StreamId::new(1), "app", Bytes::from_static(payload));
        m.with_created_at_for_test(chrono::Utc::now() + chrono::Duration::milliseconds(millis_offset))
    }

    #[test_case(9_999, 9_999, 0; "just under the event limit")]
    #[test_case(10_000, 10_000, 0; "exactly at the event limit")]
    #[test_case(10_001, 10_000, 1; "one past the event limit")]
    fn splits_batch_at_the_ten_thousand_event_boundary(total: i64, expect_batch: usize, expect_rest: usize) {
        let messages: Vec<Message> = (0..total).map(|i| msg_at(b"x", i)).collect();
        let (batch, rest) = split_batch(messages, "app");
        assert_eq!(batch.len(), expect_batch);
        assert_eq!(rest.len(), expect_rest);
    }

    #[test]
    fn splits_batch_when_next_message_would_exceed_byte_budget() {
        let big_payload: &'static [u8] = &[0u8; 1_048_576 - EVENT_OVERHEAD_BYTES];
        let messages = vec![msg_at(big_payload, 0), msg_at(b"overflow", 1)];
        let (batch, rest) = split_batch(messages, "app");
        assert_eq!(batch.len(), 1);
        assert_eq!(rest.len(), 1);
    }
}
