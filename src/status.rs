use anyhow::{bail, Context, Result};
use hyper::{Body, Client, Uri};
use hyper_tls::HttpsConnector;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::ProvisioningRequest;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// 通过外部回显服务查询本机公网IP
pub async fn public_ip(url: &str) -> Result<IpAddr> {
    let uri: Uri = url.parse().with_context(|| format!("invalid public IP service URL: {url}"))?;
    let client = Client::builder().build::<_, Body>(HttpsConnector::new());

    let response = tokio::time::timeout(LOOKUP_TIMEOUT, client.get(uri))
        .await
        .context("public IP lookup timed out")??;
    if !response.status().is_success() {
        bail!("public IP service returned {}", response.status());
    }

    let body = hyper::body::to_bytes(response.into_body()).await?;
    let text = String::from_utf8_lossy(&body);
    let ip = text
        .trim()
        .parse::<IpAddr>()
        .with_context(|| format!("unexpected public IP response: {:?}", text.trim()))?;
    Ok(ip)
}

/// 运行结束时展示给操作员的摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub server_names: Vec<String>,
    pub upstream: String,
    pub public_ip: Option<IpAddr>,
}

impl StatusReport {
    pub fn new(request: &ProvisioningRequest, public_ip: Option<IpAddr>) -> Self {
        Self {
            server_names: request.server_names(),
            upstream: request.upstream().to_string(),
            public_ip,
        }
    }

    pub fn summary(&self) -> String {
        let mut lines = vec!["Provisioning complete.".to_string()];
        if let Some(domain) = self.server_names.first() {
            lines.push(format!("  Site:      https://{domain} -> {}", self.upstream));
        }
        match self.public_ip {
            Some(ip) => {
                lines.push(format!("  Public IP: {ip}"));
                let record = if ip.is_ipv4() { "A" } else { "AAAA" };
                for name in &self.server_names {
                    lines.push(format!("  DNS:       {name} {record} {ip}"));
                }
            }
            None => lines.push("  Public IP: unavailable".to_string()),
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CertificateSource;
    use crate::firewall::FirewallProfile;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_summary_with_ip() {
        let request = ProvisioningRequest::new(
            "example.com",
            "http://backend:3000",
            FirewallProfile::Full,
            CertificateSource::Acme { email: None },
        )
        .unwrap();
        let report = StatusReport::new(&request, Some("203.0.113.7".parse().unwrap()));
        let summary = report.summary();

        assert!(summary.contains("https://example.com -> http://backend:3000"));
        assert!(summary.contains("Public IP: 203.0.113.7"));
        assert!(summary.contains("www.example.com A 203.0.113.7"));
    }

    #[test]
    fn test_summary_without_ip() {
        let report = StatusReport {
            server_names: vec!["example.com".to_string()],
            upstream: "http://backend:3000".to_string(),
            public_ip: None,
        };
        assert!(report.summary().contains("Public IP: unavailable"));
    }

    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_public_ip_lookup() {
        let url = serve_once("198.51.100.23\n").await;
        let ip = public_ip(&url).await.unwrap();
        assert_eq!(ip, "198.51.100.23".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_public_ip_rejects_garbage() {
        let url = serve_once("<html>blocked</html>").await;
        assert!(public_ip(&url).await.is_err());
        assert!(public_ip("not a url at all").await.is_err());
    }
}
