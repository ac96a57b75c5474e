// Classifier backed by remote recognition replicas speaking the legacy
// `/ocr` and `/slide` JSON protocol.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::warn;

use crate::classifier::{Classifier, SlideMatcher};
use crate::error::ClassifierError;
use crate::load_balancer::LoadBalancer;
use crate::models::Offset;

// Backend reply: {"code": 0, "data": ...} or {"code": n, "message": "..."}
#[derive(Deserialize)]
struct BackendReply<T> {
    code: i64,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Serialize)]
struct OcrPayload {
    image: String,
}

#[derive(Serialize)]
struct SlidePayload {
    bg_image: String,
    slide_image: String,
}

pub struct RemoteClassifier {
    pool: Arc<LoadBalancer>,
    client: reqwest::Client,
    // blocking callers drive the async client through this handle
    runtime: Handle,
}

impl RemoteClassifier {
    pub fn new(pool: Arc<LoadBalancer>, client: reqwest::Client, runtime: Handle) -> Self {
        Self { pool, client, runtime }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClassifierError> {
        let backend = self.pool.get_backend().ok_or(ClassifierError::Unavailable)?;

        let url = format!("{}{}", backend.url, path);
        let res = match self.client.post(url).json(body).send().await {
            Ok(res) => res,
            // Marking backend as unhealthy on transport error
            Err(e) => {
                backend.set_healthy(false);
                warn!(
                    pool = self.pool.name(),
                    backend = %backend.url,
                    error = %e,
                    "backend failed, marked unhealthy"
                );
                return Err(ClassifierError::Backend(format!("request failed: {}", e)));
            }
        };

        let reply: BackendReply<T> = res
            .json()
            .await
            .map_err(|e| ClassifierError::Backend(format!("parse error: {}", e)))?;

        match reply {
            BackendReply { code: 0, data: Some(data), .. } => Ok(data),
            BackendReply { code, message, .. } => Err(ClassifierError::Backend(
                message.unwrap_or_else(|| format!("backend returned code {}", code)),
            )),
        }
    }
}

impl Classifier for RemoteClassifier {
    fn name(&self) -> &str {
        self.pool.name()
    }

    fn classify(&self, image: &[u8]) -> Result<String, ClassifierError> {
        let payload = OcrPayload {
            image: STANDARD.encode(image),
        };
        self.runtime.block_on(self.post("/ocr", &payload))
    }
}

impl SlideMatcher for RemoteClassifier {
    fn slide_match(&self, background: &[u8], slider: &[u8]) -> Result<Offset, ClassifierError> {
        let payload = SlidePayload {
            bg_image: STANDARD.encode(background),
            slide_image: STANDARD.encode(slider),
        };
        self.runtime.block_on(self.post("/slide", &payload))
    }
}
