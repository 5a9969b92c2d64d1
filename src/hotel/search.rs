use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::settings::HotelSettings;

/// Marketing token stripped from listed channel names.
const HD_TOKEN: &str = "高清";

const ALIVE_SELECTOR: &str = r#"div[style="color:limegreen; "]"#;

/// A channel advertised by a hotel relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelChannel {
    pub name: String,
    pub url: String,
}

impl HotelChannel {
    pub fn line(&self) -> String {
        format!("{},{}", self.name, self.url)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css}: {e}"))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Endpoints of search results flagged alive, in document order.
pub fn extract_endpoints(html: &str) -> Result<Vec<String>> {
    let alive = selector(ALIVE_SELECTOR)?;
    let link = selector("a")?;
    let doc = Html::parse_document(html);

    let mut endpoints = Vec::new();
    for marker in doc.select(&alive) {
        let Some(result) = marker
            .parent()
            .and_then(|p| p.parent())
            .and_then(ElementRef::wrap)
        else {
            continue;
        };
        if let Some(a) = result.select(&link).next() {
            let text = element_text(a);
            if !text.is_empty() {
                endpoints.push(text);
            }
        }
    }
    Ok(endpoints)
}

/// `(name, url)` pairs from a relay's channel listing page.
pub fn extract_listing(html: &str) -> Result<Vec<HotelChannel>> {
    let m3u8 = selector("div.m3u8")?;
    let channel = selector(".channel")?;
    let doc = Html::parse_document(html);

    let mut channels = Vec::new();
    for el in doc.select(&m3u8) {
        let Some(row) = el.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let Some(name_el) = row.select(&channel).next() else {
            continue;
        };
        let name = element_text(name_el).replace(HD_TOKEN, "");
        let url = element_text(el);
        if name.is_empty() || url.is_empty() {
            continue;
        }
        channels.push(HotelChannel { name, url });
    }
    Ok(channels)
}

/// TCP connect check; any failure counts as unreachable.
pub async fn is_reachable(endpoint: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(endpoint)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            info!("Connecting to {} failed: {}", endpoint, e);
            false
        }
        Err(_) => {
            info!("Connecting to {} timed out", endpoint);
            false
        }
    }
}

/// Session against the hotel IPTV search site.
pub struct HotelClient {
    client: reqwest::Client,
    base_url: String,
    origin: String,
}

impl HotelClient {
    pub fn new(settings: &HotelSettings) -> Result<Self> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        let origin = Url::parse(&base_url)
            .with_context(|| format!("parsing hotel base url {base_url}"))?
            .origin()
            .ascii_serialization();
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            origin,
        })
    }

    fn headers(&self, referer: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_str(&self.origin)?);
        headers.insert(REFERER, HeaderValue::from_str(referer)?);
        Ok(headers)
    }

    /// Raw endpoint candidates for a search key. Transport errors propagate.
    pub async fn search(&self, key: &str) -> Result<Vec<String>> {
        let url = format!("{}/hoteliptv.php", self.base_url);
        let resp = self
            .client
            .post(&url)
            .headers(self.headers(&url)?)
            .form(&[
                ("saerch", key),
                ("Submit", ""),
                ("names", "Tom"),
                ("city", "HeZhou"),
                ("address", "Ca94122"),
            ])
            .send()
            .await
            .context("hotel search request")?
            .error_for_status()?;
        let body = resp.text().await.context("reading hotel search response")?;
        extract_endpoints(&body)
    }

    /// Lists an endpoint's channels. The first request primes the session and its body is discarded.
    pub async fn list_channels(&self, endpoint: &str) -> Result<Vec<HotelChannel>> {
        let page = format!("{}/hotellist.html", self.base_url);
        let _ = self
            .client
            .get(&page)
            .headers(self.headers(&format!("{page}?s={endpoint}"))?)
            .query(&[("s", endpoint), ("Submit", " "), ("y", "y")])
            .send()
            .await
            .context("priming hotel list")?;

        let list = format!("{}/alllist.php", self.base_url);
        let resp = self
            .client
            .get(&list)
            .headers(self.headers(&format!("{page}?s={endpoint}&Submit=+&y=y"))?)
            .query(&[("s", endpoint), ("y", "false")])
            .send()
            .await
            .context("fetching hotel list")?;

        if !resp.status().is_success() {
            debug!("Hotel list for {} returned {}", endpoint, resp.status());
            return Ok(Vec::new());
        }
        let body = resp.text().await.context("reading hotel list")?;
        extract_listing(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_endpoints() {
        let html = r#"
<html><body>
<div class="result">
  <div class="channel"><a href="hotellist.html?s=1.2.3.4:8000"><b>1.2.3.4:8000</b></a></div>
  <div><div style="color:limegreen; ">新上线</div></div>
</div>
<div class="result">
  <div class="channel"><a href="hotellist.html?s=5.6.7.8:9000">5.6.7.8:9000</a></div>
  <div><div style="color:red; ">失效</div></div>
</div>
<div class="result">
  <div class="channel"><a href="hotellist.html?s=9.9.9.9:80"> 9.9.9.9:80 </a></div>
  <div><div style="color:limegreen; ">存活</div></div>
</div>
</body></html>"#;
        let endpoints = extract_endpoints(html).unwrap();
        assert_eq!(endpoints, vec!["1.2.3.4:8000", "9.9.9.9:80"]);
    }

    #[test]
    fn test_extract_listing_strips_hd_token() {
        let html = r#"
<div class="result"><div class="channel"><a>CCTV1高清</a></div><div class="m3u8"><table><tr><td>http://1.2.3.4:8000/tsfile/live/0001_1.m3u8</td></tr></table></div></div>
<div class="result"><div class="channel">湖南卫视</div><div class="m3u8"> http://1.2.3.4:8000/tsfile/live/0002_1.m3u8 </div></div>
<div class="result"><div class="m3u8">http://no-name</div></div>
"#;
        let channels = extract_listing(html).unwrap();
        assert_eq!(
            channels,
            vec![
                HotelChannel {
                    name: "CCTV1".to_string(),
                    url: "http://1.2.3.4:8000/tsfile/live/0001_1.m3u8".to_string(),
                },
                HotelChannel {
                    name: "湖南卫视".to_string(),
                    url: "http://1.2.3.4:8000/tsfile/live/0002_1.m3u8".to_string(),
                },
            ]
        );
        assert_eq!(channels[1].line(), "湖南卫视,http://1.2.3.4:8000/tsfile/live/0002_1.m3u8");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(is_reachable(&addr, Duration::from_secs(1)).await);
        drop(listener);
        assert!(!is_reachable(&addr, Duration::from_secs(1)).await);
        assert!(!is_reachable("not-an-endpoint", Duration::from_secs(1)).await);
    }
}
