// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS forwarder applying the live rewrite rules.
//!
//! [`DnsServer`] serves UDP and TCP on the same address through hickory's
//! `ServerFuture`. Every question is rewritten, sent upstream by a
//! [`Forwarder`], and the answer is mapped back to the name the client asked
//! for. Upstream answers truncated over UDP are fetched again over TCP.
//!
//! Work in flight upstream is capped at [`MAX_CONCURRENT_QUERIES`]; queries
//! beyond that are answered `SERVFAIL` at once.

use crate::constants::{MAX_CONCURRENT_QUERIES, MAX_UDP_PAYLOAD, TCP_IDLE_TIMEOUT_SECS};
use crate::dns::rewriter::QueryRewriter;
use crate::metrics::record_dns_query;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use hickory_client::client::{AsyncClient, ClientHandle};
use hickory_client::tcp::TcpClientStream;
use hickory_client::udp::UdpClientStream;
use hickory_proto::iocompat::AsyncIoTokioAsStd;
use hickory_proto::op::{Edns, Header, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use hickory_server::ServerFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Client for the upstream resolver.
///
/// Queries go over one shared UDP exchange. A truncated answer is retried on
/// a fresh TCP connection.
#[derive(Clone)]
pub struct Forwarder {
    upstream: SocketAddr,
    timeout: Duration,
    udp: AsyncClient,
}

impl Forwarder {
    /// Open the UDP exchange to `upstream`.
    ///
    /// # Errors
    ///
    /// Returns an error if the local socket cannot be set up.
    pub async fn connect(upstream: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = UdpClientStream::<UdpSocket>::with_timeout(upstream, timeout);
        let (udp, background) = AsyncClient::connect(stream)
            .await
            .with_context(|| format!("failed to open DNS client to {upstream}"))?;
        tokio::spawn(background);

        Ok(Self {
            upstream,
            timeout,
            udp,
        })
    }

    #[must_use]
    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Resolve one question upstream.
    ///
    /// # Errors
    ///
    /// Returns an error when the upstream does not answer within the timeout
    /// or the exchange fails.
    pub async fn query(&self, name: Name, class: DNSClass, rtype: RecordType) -> Result<Message> {
        let response = self
            .exchange(self.udp.clone(), name.clone(), class, rtype)
            .await?;
        if !response.truncated() {
            return Ok(response);
        }

        debug!(name = %name, upstream = %self.upstream, "Upstream answer truncated, retrying over TCP");
        let (stream, sender) =
            TcpClientStream::<AsyncIoTokioAsStd<TcpStream>>::with_timeout(self.upstream, self.timeout);
        let (tcp, background) = AsyncClient::new(stream, sender, None)
            .await
            .with_context(|| format!("failed to connect to {} over TCP", self.upstream))?;
        tokio::spawn(background);

        self.exchange(tcp, name, class, rtype).await
    }

    async fn exchange(
        &self,
        mut client: AsyncClient,
        name: Name,
        class: DNSClass,
        rtype: RecordType,
    ) -> Result<Message> {
        let response = tokio::time::timeout(self.timeout, client.query(name, class, rtype))
            .await
            .with_context(|| {
                format!(
                    "no answer from {} within {}ms",
                    self.upstream,
                    self.timeout.as_millis()
                )
            })??;
        Ok(response.into_message())
    }
}

/// Request handler rewriting questions before forwarding them.
pub struct RewriteHandler {
    rewriter: Arc<QueryRewriter>,
    forwarder: Forwarder,
    permits: Arc<Semaphore>,
}

impl RewriteHandler {
    #[must_use]
    pub fn new(rewriter: Arc<QueryRewriter>, forwarder: Forwarder) -> Self {
        Self::with_capacity(rewriter, forwarder, MAX_CONCURRENT_QUERIES)
    }

    /// Handler allowing `capacity` queries upstream at once.
    #[must_use]
    pub fn with_capacity(
        rewriter: Arc<QueryRewriter>,
        forwarder: Forwarder,
        capacity: usize,
    ) -> Self {
        Self {
            rewriter,
            forwarder,
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Answer `query` through the upstream, with the rewrite undone.
    ///
    /// The returned message carries the question exactly as the client sent
    /// it and every record renamed back from the rewrite target.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream exchange fails.
    pub async fn lookup(&self, query: &Query) -> Result<Message> {
        let mut message = Message::new();
        message.add_query(query.clone());
        let applied = self.rewriter.rewrite_query(&mut message);
        let question = message.queries().first().unwrap_or(query);

        let result = self
            .forwarder
            .query(
                question.name().clone(),
                question.query_class(),
                question.query_type(),
            )
            .await;
        let mut response = match result {
            Ok(response) => {
                record_dns_query(if applied.is_some() {
                    "rewritten"
                } else {
                    "passthrough"
                });
                response
            }
            Err(e) => {
                record_dns_query("error");
                return Err(e);
            }
        };

        if let Some(applied) = &applied {
            applied.restore(&mut response);
        }
        Ok(response)
    }
}

#[async_trait]
impl RequestHandler for RewriteHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        if request.message_type() != MessageType::Query || request.op_code() != OpCode::Query {
            debug!(op_code = ?request.op_code(), src = %request.src(), "Refusing non-query DNS message");
            return reply_error(request, response_handle, ResponseCode::NotImp).await;
        }
        let Some(query) = std::slice::from_ref(request.query()).first() else {
            return reply_error(request, response_handle, ResponseCode::FormErr).await;
        };

        let Ok(_permit) = self.permits.try_acquire() else {
            warn!(src = %request.src(), "Too many DNS queries in flight");
            record_dns_query("error");
            return reply_error(request, response_handle, ResponseCode::ServFail).await;
        };

        match self.lookup(query.original()).await {
            Ok(upstream) => reply(request, response_handle, &upstream).await,
            Err(e) => {
                warn!(
                    upstream = %self.forwarder.upstream(),
                    name = %query.name(),
                    error = %format!("{e:#}"),
                    "Upstream DNS query failed"
                );
                reply_error(request, response_handle, ResponseCode::ServFail).await
            }
        }
    }
}

async fn reply<R: ResponseHandler>(
    request: &Request,
    mut response_handle: R,
    upstream: &Message,
) -> ResponseInfo {
    let mut header = Header::response_from_request(request.header());
    header
        .set_response_code(upstream.response_code())
        .set_authoritative(upstream.authoritative())
        .set_recursion_available(upstream.recursion_available())
        .set_authentic_data(upstream.authentic_data());

    let mut builder = MessageResponseBuilder::from_message_request(request);
    if let Some(client_edns) = request.edns() {
        let mut edns = Edns::new();
        edns.set_max_payload(client_edns.max_payload().clamp(512, MAX_UDP_PAYLOAD));
        builder.edns(edns);
    }

    let response = builder.build(
        header,
        upstream.answers().iter(),
        upstream.name_servers().iter(),
        std::iter::empty(),
        upstream.additionals().iter(),
    );
    match response_handle.send_response(response).await {
        Ok(info) => info,
        Err(e) => {
            warn!(src = %request.src(), error = %e, "Failed to send DNS reply");
            servfail_info(request.header())
        }
    }
}

async fn reply_error<R: ResponseHandler>(
    request: &Request,
    mut response_handle: R,
    code: ResponseCode,
) -> ResponseInfo {
    let response =
        MessageResponseBuilder::from_message_request(request).error_msg(request.header(), code);
    match response_handle.send_response(response).await {
        Ok(info) => info,
        Err(e) => {
            warn!(src = %request.src(), error = %e, "Failed to send DNS error reply");
            servfail_info(request.header())
        }
    }
}

fn servfail_info(request_header: &Header) -> ResponseInfo {
    let mut header = Header::response_from_request(request_header);
    header.set_response_code(ResponseCode::ServFail);
    header.into()
}

/// Rewriting DNS forwarder listening on UDP and TCP.
pub struct DnsServer {
    server: ServerFuture<RewriteHandler>,
    local_addr: SocketAddr,
}

impl DnsServer {
    /// Bind UDP and TCP listeners on `listen`.
    ///
    /// With port 0 the TCP listener takes the port the UDP socket was given.
    ///
    /// # Errors
    ///
    /// Returns an error if either listener cannot be bound.
    pub async fn bind(
        listen: SocketAddr,
        rewriter: Arc<QueryRewriter>,
        forwarder: Forwarder,
    ) -> Result<Self> {
        let udp_socket = UdpSocket::bind(listen)
            .await
            .with_context(|| format!("failed to bind DNS UDP socket on {listen}"))?;
        let local_addr = udp_socket.local_addr()?;
        let tcp_listener = TcpListener::bind(local_addr)
            .await
            .with_context(|| format!("failed to bind DNS TCP listener on {local_addr}"))?;

        let mut server = ServerFuture::new(RewriteHandler::new(rewriter, forwarder));
        server.register_socket(udp_socket);
        server.register_listener(tcp_listener, Duration::from_secs(TCP_IDLE_TIMEOUT_SECS));
        debug!(addr = %local_addr, "DNS UDP and TCP listeners bound");

        Ok(Self { server, local_addr })
    }

    /// Address the server is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve queries until the listeners fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the server stops on a listener failure.
    pub async fn run(mut self) -> Result<()> {
        info!(listen = %self.local_addr, "DNS rewrite server ready");
        self.server
            .block_until_done()
            .await
            .context("DNS server stopped")
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod server_tests;
