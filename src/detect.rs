//! Object-detection collaborator for layout analysis.
//!
//! The detection model runs as a local HTTP service that accepts a
//! rendered page image and returns labeled bounding boxes. The confidence
//! threshold and input size are passed through as request parameters —
//! detections below threshold are dropped by the service itself, never
//! post-filtered here.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use serde::Deserialize;

use crate::config::DetectionConfig;
use crate::layout::{BBox, ElementLabel};

/// One detected region on a page.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BBox,
    pub label: ElementLabel,
    pub confidence: f32,
}

/// A layout-detection model reachable as a request/response collaborator.
#[async_trait]
pub trait LayoutDetector: Send + Sync {
    /// Detect layout regions on a rendered page image.
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// HTTP client for a local layout-detection service (e.g. a
/// DocLayout-YOLO microservice). Pages are posted as PNG bytes with the
/// configured confidence and input-size parameters.
pub struct HttpLayoutDetector {
    client: reqwest::Client,
    endpoint: String,
    conf_threshold: f32,
    image_size: u32,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    bbox: [f32; 4],
    label: String,
    confidence: f32,
}

impl HttpLayoutDetector {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build detection HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            conf_threshold: config.conf_threshold,
            image_size: config.image_size,
        })
    }
}

#[async_trait]
impl LayoutDetector for HttpLayoutDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .context("failed to encode page image")?;

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("conf", self.conf_threshold.to_string()),
                ("imgsz", self.image_size.to_string()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(png)
            .send()
            .await
            .context("detection request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("detection service error {}: {}", status, body));
        }

        let wire: Vec<WireDetection> = response
            .json()
            .await
            .context("failed to parse detection response")?;

        let mut detections = Vec::with_capacity(wire.len());
        for det in wire {
            let Some(label) = ElementLabel::parse(&det.label) else {
                tracing::warn!(label = %det.label, "skipping detection with unknown label");
                continue;
            };
            detections.push(Detection {
                bbox: BBox {
                    x1: det.bbox[0],
                    y1: det.bbox[1],
                    x2: det.bbox[2],
                    y2: det.bbox[3],
                },
                label,
                confidence: det.confidence,
            });
        }
        Ok(detections)
    }
}
