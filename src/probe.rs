use crate::config::DisplayConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// How much of the image is fetched for dimension probing. Header metadata
/// for the common formats sits well inside the first 64 KiB.
const PROBE_RANGE_BYTES: u64 = 64 * 1024;

/// Resolves display heights for detection images.
///
/// Fetches just enough of an image to read its natural dimensions, then
/// scales the configured display width by the aspect ratio. Any probe
/// failure falls back to the configured default height. Successful probes
/// are memoized per URL so re-rendering a row never re-fetches.
pub struct ImageHeightResolver {
    client: reqwest::Client,
    display_width: f32,
    default_height: f32,
    cache: Arc<RwLock<HashMap<String, f32>>>,
}

impl ImageHeightResolver {
    pub fn new(display: &DisplayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            display_width: display.width,
            default_height: display.default_row_height,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve the display height for an image URL.
    ///
    /// Never fails; probe errors yield the default height and are not
    /// cached, so a later render retries the probe.
    pub async fn resolve(&self, url: &str) -> f32 {
        if let Some(height) = self.cache.read().await.get(url) {
            trace!("Height cache hit for {}", url);
            return *height;
        }

        match self.probe_dimensions(url).await {
            Ok((width, height)) => match scaled_height(self.display_width, width, height) {
                Some(display_height) => {
                    debug!(
                        "Probed {}: {}x{} -> display height {:.1}",
                        url, width, height, display_height
                    );
                    self.cache
                        .write()
                        .await
                        .insert(url.to_string(), display_height);
                    display_height
                }
                None => {
                    debug!("Probe of {} returned degenerate {}x{}", url, width, height);
                    self.default_height
                }
            },
            Err(e) => {
                debug!("Probe of {} failed, using default height: {}", url, e);
                self.default_height
            }
        }
    }

    /// Fetch the image header bytes and decode the natural dimensions
    async fn probe_dimensions(&self, url: &str) -> Result<(u32, u32)> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::RANGE,
                format!("bytes=0-{}", PROBE_RANGE_BYTES - 1),
            )
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;

        let reader = image::io::Reader::new(Cursor::new(bytes.as_ref())).with_guessed_format()?;
        let dimensions = reader.into_dimensions()?;
        Ok(dimensions)
    }

    /// Number of memoized heights
    pub async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }
}

impl Clone for ImageHeightResolver {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            display_width: self.display_width,
            default_height: self.default_height,
            cache: Arc::clone(&self.cache),
        }
    }
}

/// Display height preserving the natural aspect ratio, or None for
/// degenerate dimensions
fn scaled_height(display_width: f32, width: u32, height: u32) -> Option<f32> {
    if width == 0 || height == 0 {
        return None;
    }
    Some((display_width * height as f32 / width as f32).max(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DoorwatchConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Valid 4x3 RGB PNG
    const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x03, 0x08, 0x02, 0x00, 0x00,
        0x00, 0x3b, 0x96, 0x39, 0x91, 0x00, 0x00, 0x00, 0x10, 0x49, 0x44, 0x41, 0x54, 0x78,
        0x9c, 0x63, 0x10, 0x50, 0x30, 0x80, 0x23, 0x06, 0x9c, 0x1c, 0x00, 0x56, 0x67, 0x04,
        0x81, 0x23, 0xb9, 0x46, 0x3d, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae,
        0x42, 0x60, 0x82,
    ];

    fn resolver() -> ImageHeightResolver {
        let config = DoorwatchConfig::default();
        ImageHeightResolver::new(&config.display)
    }

    /// Serve one HTTP response with the tiny PNG body, return the bound address
    async fn serve_png_once() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;

            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                TINY_PNG.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(TINY_PNG).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        addr
    }

    #[tokio::test]
    async fn test_probe_scales_by_aspect_ratio() {
        let resolver = resolver();
        let addr = serve_png_once().await;

        let url = format!("http://{}/latest.png", addr);
        let height = resolver.resolve(&url).await;

        // 4x3 image at display width 350 -> 262.5
        assert_eq!(height, 262.5);
        assert_eq!(resolver.cached_entries().await, 1);
    }

    #[tokio::test]
    async fn test_probe_failure_falls_back_to_default() {
        let resolver = resolver();

        // Nothing listens on this port; the probe fails at connect
        let height = resolver.resolve("http://127.0.0.1:9/unreachable.png").await;
        assert_eq!(height, 250.0);

        // Failures are not memoized
        assert_eq!(resolver.cached_entries().await, 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_probe() {
        let resolver = resolver();
        resolver
            .cache
            .write()
            .await
            .insert("https://x/a.png".to_string(), 175.0);

        let height = resolver.resolve("https://x/a.png").await;
        assert_eq!(height, 175.0);
    }

    #[test]
    fn test_scaled_height() {
        assert_eq!(scaled_height(350.0, 700, 500), Some(250.0));
        assert_eq!(scaled_height(350.0, 0, 500), None);
        assert_eq!(scaled_height(350.0, 500, 0), None);
        // Very wide images still get a positive height
        assert_eq!(scaled_height(350.0, 100_000, 1), Some(1.0));
    }
}
