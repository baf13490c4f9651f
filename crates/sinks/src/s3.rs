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

//! S3 sink: treats each file rotation as a new object. A closed batch is
//! uploaded whole through a single `put_object` call; multipart upload is a
//! declared-but-unimplemented enhancement upstream and stays that way here
//! (see the repository's `DESIGN.md` for the open-question resolution). S3
//! is request-per-object rather than connection-oriented, so this sink has
//! no persistent [`Writer`](logship_core::Writer) to report `size`/
//! `is_accessible` on between uploads — it plugs into a file producer's
//! already-closed-and-rotated artifact instead, via [`S3Sink::upload_rotated_file`].

use bytes::Bytes;

use crate::error::{self, Result};

/// Thin seam over the S3 SDK client.
#[async_trait::async_trait]
pub trait S3Client: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()>;
}

pub struct AwsS3Client {
    inner: aws_sdk_s3::Client,
}

impl AwsS3Client {
    #[must_use]
    pub fn new(inner: aws_sdk_s3::Client) -> Self { AwsS3Client { inner } }
}

#[async_trait::async_trait]
impl S3Client for AwsS3Client {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        self.inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .send()
            .await
            .map(drop)
            .map_err(|e| crate::error::Error::S3 { source: Box::new(e), loc: snafu::Location::new(file!(), line!(), column!()) })
    }
}

pub struct S3SinkConfig {
    pub bucket: String,
    /// Prefix prepended to every object key, without a trailing slash.
    pub sub_folder: String,
}

pub struct S3Sink<C: S3Client> {
    name: String,
    client: C,
    cfg: S3SinkConfig,
}

impl<C: S3Client> S3Sink<C> {
    pub fn new(name: impl Into<String>, client: C, cfg: S3SinkConfig) -> Self { S3Sink { name: name.into(), client, cfg } }

    /// Object key for a rotated artifact named `final_name`.
    #[must_use]
    pub fn object_key(&self, final_name: &str) -> String {
        if self.cfg.sub_folder.is_empty() { final_name.to_string() } else { format!("{}/{}", self.cfg.sub_folder, final_name) }
    }

    /// Uploads one closed rotation's bytes as a single object. Returns
    /// `Err` so the caller (the file producer's background-close path) can
    /// decide how to surface the failure; there is no per-message fallback
    /// at this layer since the unit of delivery is a whole file, not a
    /// message.
    pub async fn upload_rotated_file(&self, final_name: &str, body: Bytes) -> Result<()> {
        let key = self.object_key(final_name);
        match self.client.put_object(&self.cfg.bucket, &key, body).await {
            Ok(()) => {
                logship_core::metrics::MESSAGES_WRITTEN.with_label_values(&[&self.name, final_name]).inc();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(sink = %self.name, bucket = %self.cfg.bucket, key = %key, error = %e, "s3 put_object failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingClient {
        uploads: std::sync::Mutex<Vec<(String, String, Bytes)>>,
    }

    #[async_trait::async_trait]
    impl S3Client for RecordingClient {
        async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
            self.uploads.lock().unwrap().push((bucket.to_string(), key.to_string(), body));
            Ok(())
        }
    }

    #[tokio::test]
    async fn object_key_joins_sub_folder_and_final_name() {
        let client = RecordingClient { uploads: std::sync::Mutex::new(Vec::new()) };
        let sink = S3Sink::new("s3-test", client, S3SinkConfig { bucket: "logs".to_string(), sub_folder: "app".to_string() });
        sink.upload_rotated_file("app_2026-01-01.log", Bytes::from_static(b"a\nb\n")).await.unwrap();
        let uploads = sink.client.uploads.lock().unwrap();
        assert_eq!(uploads[0], ("logs".to_string(), "app/app_2026-01-01.log".to_string(), Bytes::from_static(b"a\nb\n")));
    }

    #[tokio::test]
    async fn empty_sub_folder_uses_bare_final_name_as_key() {
        let client = RecordingClient { uploads: std::sync::Mutex::new(Vec::new()) };
        let sink = S3Sink::new("s3-test", client, S3SinkConfig { bucket: "logs".to_string(), sub_folder: String::new() });
        assert_eq!(sink.object_key("app.log"), "app.log");
    }
}
