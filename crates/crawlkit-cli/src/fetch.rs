//! `fetch` command: requests through the chosen dispatch client.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, ValueEnum};
use crawlkit_core::AppConfig;
use crawlkit_http::{
    Client, CookieJar, HeaderName, HeaderValue, LocalCookieJar, Options, Reliability, Request,
    RequestMeta, Response,
};
use crawlkit_proxy::{
    GatewayClient, GatewayConfig, ProxyClient, RemoteCookieJar, RpcChannel, RpcConfig,
};
use futures::stream::{self, StreamExt};

/// Which backend carries the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Via {
    /// The proxy-manager RPC service
    Proxy,
    /// The hosted crawling-API gateway
    Gateway,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Absolute URLs to fetch
    #[arg(required = true)]
    pub urls: Vec<String>,
    /// Requests in flight at once when several URLs are given
    #[arg(long, default_value = "4")]
    pub concurrency: usize,
    /// Dispatch backend
    #[arg(long, value_enum, default_value = "proxy")]
    pub via: Via,
    /// HTTP method
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,
    /// Request body sent as-is; the gateway backend only accepts body-less GETs
    #[arg(long)]
    pub data: Option<String>,
    /// Proxy tier: low, medium, high or ha
    #[arg(long, default_value = "low")]
    pub reliability: Reliability,
    /// Render the page in a headless browser
    #[arg(long)]
    pub headless: bool,
    /// Milliseconds to wait for scripts when rendering headless
    #[arg(long)]
    pub js_wait_ms: Option<u64>,
    /// Bootstrap a remote session before the request
    #[arg(long)]
    pub session_init: bool,
    /// Keep the remote session for later requests
    #[arg(long)]
    pub keep_session: bool,
    /// Do not follow redirects
    #[arg(long)]
    pub no_redirect: bool,
    /// Overall deadline for the request, in seconds
    #[arg(long, default_value = "300")]
    pub timeout_secs: u64,
    /// Extra request header as `Name:Value`; repeatable
    #[arg(long = "header", short = 'H', value_parser = parse_header_arg)]
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Tracing id shared with the remote services' logs
    #[arg(long)]
    pub tracing_id: Option<String>,
    /// Skip printing the response body
    #[arg(long)]
    pub no_body: bool,
}

impl FetchArgs {
    pub(crate) fn options(&self) -> Options {
        Options {
            enable_proxy: true,
            reliability: self.reliability,
            enable_headless: self.headless,
            enable_session_init: self.session_init,
            keep_session: self.keep_session,
            disable_redirect: self.no_redirect,
            js_wait_duration: self.js_wait_ms.map(Duration::from_millis),
            ..Options::default()
        }
    }

    pub(crate) fn request(&self, url: &str) -> anyhow::Result<Request> {
        let body = self.data.clone().map(Into::into);
        let mut request = Request::new(&self.method, url, body)?;
        for (name, value) in &self.headers {
            request.headers.append(name.clone(), value.clone());
        }

        let mut meta = RequestMeta::new().with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(tracing_id) = &self.tracing_id {
            meta = meta.with_tracing_id(tracing_id.clone());
        }
        Ok(request.with_meta(meta))
    }
}

/// Parses a `Name:Value` header argument.
pub(crate) fn parse_header_arg(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("header \"{raw}\" is not in Name:Value form"))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| format!("invalid header name \"{}\": {e}", name.trim()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| format!("invalid value for header {name}: {e}"))?;
    Ok((name, value))
}

fn build_client(config: &AppConfig, via: Via) -> anyhow::Result<Arc<dyn Client>> {
    match via {
        Via::Proxy => {
            let proxy = RpcChannel::new(RpcConfig::from_app_config(config, &config.proxy_manager_url))
                .context("building proxy-manager channel")?;
            let session =
                RpcChannel::new(RpcConfig::from_app_config(config, &config.session_manager_url))
                    .context("building session-manager channel")?;
            let jar: Arc<dyn CookieJar> = Arc::new(RemoteCookieJar::new(Arc::new(session)));
            Ok(Arc::new(ProxyClient::new(Arc::new(proxy), jar)))
        }
        Via::Gateway => {
            let jar: Arc<dyn CookieJar> = Arc::new(LocalCookieJar::new());
            let client = GatewayClient::new(GatewayConfig::from_app_config(config), jar)
                .context("building gateway client (is CRAWLKIT_GATEWAY_API_TOKEN set?)")?;
            Ok(Arc::new(client))
        }
    }
}

/// Runs `fetch` and prints every result to stdout in argument order.
///
/// # Errors
///
/// Returns an error if the client cannot be built or any of the URLs
/// could not be fetched. Per-URL failures are reported as they happen.
pub(crate) async fn run_fetch(config: &AppConfig, args: &FetchArgs) -> anyhow::Result<()> {
    let client = build_client(config, args.via)?;
    let options = args.options();
    let banner = args.urls.len() > 1;

    let results = stream::iter(args.urls.iter().map(|url| {
        let client = Arc::clone(&client);
        let options = &options;
        async move {
            let request = args.request(url)?;
            tracing::info!(
                url = %request.url,
                via = ?args.via,
                reliability = %options.reliability,
                "fetching"
            );
            client
                .do_with_options(request, options)
                .await
                .with_context(|| format!("fetching {url}"))
        }
    }))
    .buffered(args.concurrency.max(1))
    .collect::<Vec<_>>()
    .await;

    let mut failed = 0usize;
    let mut stdout = std::io::stdout().lock();
    for (url, result) in args.urls.iter().zip(results) {
        if banner {
            writeln!(stdout, "==> {url} <==")?;
        }
        match result {
            Ok(mut response) => {
                write_summary(&mut stdout, &response)?;
                if !args.no_body {
                    writeln!(stdout)?;
                    stdout.write_all(&response.body.bytes())?;
                    writeln!(stdout)?;
                }
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(url = %url, error = %format!("{e:#}"), "fetch failed");
                writeln!(stdout, "error: {e:#}")?;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} fetches failed", args.urls.len());
    }
    Ok(())
}

/// Status, headers and redirect chain of `response`, oldest hop first.
pub(crate) fn write_summary(out: &mut impl std::io::Write, response: &Response) -> std::io::Result<()> {
    let hops: Vec<&Response> = response.redirect_chain().collect();
    if !hops.is_empty() {
        writeln!(out, "redirect chain:")?;
        for hop in hops.iter().rev() {
            let url = hop.url().map_or("?", |u| u.as_str());
            writeln!(out, "  {} {url}", hop.status_text)?;
        }
    }

    writeln!(out, "{} {}", response.proto, response.status_text)?;
    if let Some(url) = response.url() {
        writeln!(out, "url: {url}")?;
    }
    for (name, value) in &response.headers {
        writeln!(out, "{name}: {}", String::from_utf8_lossy(value.as_bytes()))?;
    }
    if response.uncompressed {
        writeln!(out, "(body decoded upstream)")?;
    }
    Ok(())
}
