//! S3 collaborator: client construction and the cyclic object key
//!
//! The AWS SDK client is built from the ambient environment, with a single
//! anonymous fallback when no credentials are discoverable. [`S3ObjectKey`]
//! adapts a GET response stream to the [`ObjectKey`](crate::ObjectKey)
//! contract, including the cyclic part of it: reading again after a close
//! re-issues the GET and starts over from byte zero. The sequential reader
//! wrapping the key is what suppresses that restart.

use std::future::Future;
use std::io;

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::runtime::Handle;

use crate::sequential::ObjectKey;

/// Build an S3 client from the default config chain.
///
/// The default credentials chain is probed exactly once; when it yields
/// nothing the client is rebuilt without credentials so public buckets
/// remain readable. Errors on actual requests still propagate to callers.
pub async fn connect() -> Result<Client> {
    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

    let authenticated = match config.credentials_provider() {
        Some(provider) => provider.provide_credentials().await.is_ok(),
        None => false,
    };
    if authenticated {
        return Ok(Client::new(&config));
    }

    tracing::debug!("no AWS credentials discovered, connecting anonymously");
    let config = aws_config::defaults(BehaviorVersion::latest())
        .no_credentials()
        .load()
        .await;
    Ok(Client::new(&config))
}

/// An S3 object handle with the native cyclic read contract.
///
/// The synchronous [`ObjectKey`] methods bridge into the async SDK with
/// `block_in_place`, which tokio only supports on the multi-thread runtime
/// flavor. Calling `read` from a current-thread runtime (the
/// `#[tokio::test]` default) panics inside tokio; use
/// `#[tokio::test(flavor = "multi_thread")]` or a full runtime.
pub struct S3ObjectKey {
    client: Client,
    bucket: String,
    key: String,
    runtime: Handle,
    /// Response stream for the current pass; `None` after close or EOF.
    body: Option<ByteStream>,
}

impl S3ObjectKey {
    /// Open the object, issuing the initial GET eagerly so that
    /// access-denied and not-found errors surface at resolution time
    /// instead of on the first downstream read.
    pub async fn open(client: Client, bucket: String, key: String) -> Result<Self> {
        let body = fetch(&client, &bucket, &key).await?;
        Ok(Self {
            client,
            bucket,
            key,
            runtime: Handle::current(),
            body: Some(body),
        })
    }

    pub fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

async fn fetch(client: &Client, bucket: &str, key: &str) -> Result<ByteStream> {
    let response = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .with_context(|| format!("failed to fetch object from S3: s3://{bucket}/{key}"))?;
    tracing::debug!("opened s3://{bucket}/{key}");
    Ok(response.body)
}

/// Run a future to completion from synchronous code, whether or not the
/// calling thread already lives inside the runtime.
fn block_on<F: Future>(handle: &Handle, future: F) -> F::Output {
    if Handle::try_current().is_ok() {
        tokio::task::block_in_place(|| handle.block_on(future))
    } else {
        handle.block_on(future)
    }
}

impl ObjectKey for S3ObjectKey {
    fn read(&mut self, _len: usize) -> io::Result<Bytes> {
        // Native contract: a read after close starts over from byte zero.
        if self.body.is_none() {
            let handle = self.runtime.clone();
            let body = block_on(&handle, fetch(&self.client, &self.bucket, &self.key))
                .map_err(io::Error::other)?;
            self.body = Some(body);
        }

        let handle = self.runtime.clone();
        let stream = self.body.as_mut().expect("body was just ensured");
        match block_on(&handle, stream.try_next()).map_err(io::Error::other)? {
            Some(chunk) => Ok(chunk),
            None => {
                // The transport closes itself at end of object; drop the
                // stream so the cyclic contract holds for the next read.
                self.body = None;
                Ok(Bytes::new())
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.body = None;
        Ok(())
    }
}

// Exercising S3ObjectKey requires a bucket (or an S3-compatible endpoint);
// the adapter semantics above it are covered with stub keys in
// src/sequential.rs.
