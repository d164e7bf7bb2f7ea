// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `server.rs`

#[cfg(test)]
mod tests {
    use crate::dns::rewriter::QueryRewriter;
    use crate::dns::rules::{NextAction, RewriteRule};
    use crate::dns::server::{DnsServer, Forwarder, RewriteHandler};
    use async_trait::async_trait;
    use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
    use hickory_proto::rr::rdata::{A, TXT};
    use hickory_proto::rr::{Name, RData, Record, RecordType};
    use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
    use hickory_server::server::Protocol;
    use hickory_server::authority::{MessageRequest, MessageResponse};
    use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
    use std::io;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream, UdpSocket};

    const TXT_CHUNKS: usize = 32;
    const TXT_CHUNK_LEN: usize = 250;

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    fn query(qname: &str, rtype: RecordType) -> Message {
        let mut message = Message::new();
        message
            .set_id(7)
            .set_message_type(MessageType::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(name(qname), rtype));
        message
    }

    fn rewriter() -> Arc<QueryRewriter> {
        let rewriter = QueryRewriter::new();
        rewriter.set_rules(vec![RewriteRule::new(
            "api.example.com",
            "svc1.ns1.svc.cluster.local",
            NextAction::Stop,
        )
        .unwrap()]);
        Arc::new(rewriter)
    }

    async fn handler(upstream: SocketAddr, timeout: Duration) -> RewriteHandler {
        let forwarder = Forwarder::connect(upstream, timeout).await.unwrap();
        RewriteHandler::new(rewriter(), forwarder)
    }

    async fn server(upstream: SocketAddr) -> SocketAddr {
        let forwarder = Forwarder::connect(upstream, Duration::from_secs(2))
            .await
            .unwrap();
        let server = DnsServer::bind("127.0.0.1:0".parse().unwrap(), rewriter(), forwarder)
            .await
            .unwrap();
        let listen = server.local_addr();
        tokio::spawn(server.run());
        listen
    }

    /// Upstream that answers every question with one A record named after the
    /// question it received.
    async fn echo_upstream() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
                let request = Message::from_vec(&buf[..len]).unwrap();
                let mut response = request.clone();
                response.set_message_type(MessageType::Response);
                let qname = request.queries()[0].name().clone();
                response.add_answer(Record::from_rdata(qname, 30, RData::A(A::new(10, 1, 2, 3))));
                socket.send_to(&response.to_vec().unwrap(), peer).await.unwrap();
            }
        });
        addr
    }

    /// Upstream that swallows every query.
    async fn silent_upstream() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    /// Upstream that sets TC on every UDP answer and serves the full TXT
    /// answer, larger than any UDP payload, over TCP on the same port.
    async fn truncating_upstream() -> SocketAddr {
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = udp.local_addr().unwrap();
        let tcp = TcpListener::bind(addr).await.unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let (len, peer) = udp.recv_from(&mut buf).await.unwrap();
                let mut response = Message::from_vec(&buf[..len]).unwrap();
                response
                    .set_message_type(MessageType::Response)
                    .set_truncated(true);
                udp.send_to(&response.to_vec().unwrap(), peer).await.unwrap();
            }
        });
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = tcp.accept().await.unwrap();
                tokio::spawn(async move {
                    let request = read_framed(&mut stream).await;
                    let mut response = request.clone();
                    response.set_message_type(MessageType::Response);
                    let qname = request.queries()[0].name().clone();
                    let txt = TXT::new(vec!["x".repeat(TXT_CHUNK_LEN); TXT_CHUNKS]);
                    response.add_answer(Record::from_rdata(qname, 30, RData::TXT(txt)));
                    write_framed(&mut stream, &response).await;
                });
            }
        });
        addr
    }

    async fn read_framed(stream: &mut TcpStream) -> Message {
        let len = stream.read_u16().await.unwrap();
        let mut buf = vec![0u8; usize::from(len)];
        stream.read_exact(&mut buf).await.unwrap();
        Message::from_vec(&buf).unwrap()
    }

    async fn write_framed(stream: &mut TcpStream, message: &Message) {
        let bytes = message.to_vec().unwrap();
        stream
            .write_u16(u16::try_from(bytes.len()).unwrap())
            .await
            .unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    fn txt_len(message: &Message) -> usize {
        message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::TXT(txt)) => Some(txt.txt_data().iter().map(|s| s.len()).sum::<usize>()),
                _ => None,
            })
            .sum()
    }

    /// Captures the encoded reply a handler sends.
    #[derive(Clone, Default)]
    struct CapturedResponse {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl CapturedResponse {
        fn message(&self) -> Message {
            Message::from_vec(&self.buf.lock().unwrap()).unwrap()
        }
    }

    #[async_trait]
    impl ResponseHandler for CapturedResponse {
        async fn send_response<'a>(
            &mut self,
            response: MessageResponse<
                '_,
                'a,
                impl Iterator<Item = &'a Record> + Send + 'a,
                impl Iterator<Item = &'a Record> + Send + 'a,
                impl Iterator<Item = &'a Record> + Send + 'a,
                impl Iterator<Item = &'a Record> + Send + 'a,
            >,
        ) -> io::Result<ResponseInfo> {
            let mut buf = self.buf.lock().unwrap();
            buf.clear();
            let mut encoder = BinEncoder::new(&mut *buf);
            encoder.set_max_size(u16::MAX);
            response
                .destructive_emit(&mut encoder)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        }
    }

    fn request(message: &Message) -> Request {
        let bytes = message.to_vec().unwrap();
        let mut decoder = BinDecoder::new(&bytes);
        let message = MessageRequest::read(&mut decoder).unwrap();
        Request::new(message, "127.0.0.1:40000".parse().unwrap(), Protocol::Udp)
    }

    #[tokio::test]
    async fn test_rewritten_lookup_answers_original_name() {
        let handler = handler(echo_upstream().await, Duration::from_secs(2)).await;
        let question = Query::query(name("Api.Example.com."), RecordType::A);

        let reply = handler.lookup(&question).await.unwrap();

        assert_eq!(reply.queries()[0].name().to_ascii(), "Api.Example.com.");
        assert_eq!(reply.answers().len(), 1);
        assert_eq!(reply.answers()[0].name().to_ascii(), "Api.Example.com.");
    }

    #[tokio::test]
    async fn test_unmatched_lookup_passes_through() {
        let handler = handler(echo_upstream().await, Duration::from_secs(2)).await;
        let question = Query::query(name("www.example.org."), RecordType::A);

        let reply = handler.lookup(&question).await.unwrap();
        assert_eq!(reply.answers()[0].name().to_ascii(), "www.example.org.");
    }

    #[tokio::test]
    async fn test_upstream_timeout_is_an_error() {
        let (_socket, upstream) = silent_upstream().await;
        let handler = handler(upstream, Duration::from_millis(100)).await;
        let question = Query::query(name("api.example.com."), RecordType::A);

        assert!(handler.lookup(&question).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_answer_refetched_over_tcp() {
        let forwarder = Forwarder::connect(truncating_upstream().await, Duration::from_secs(2))
            .await
            .unwrap();

        let reply = forwarder
            .query(
                name("svc1.ns1.svc.cluster.local."),
                hickory_proto::rr::DNSClass::IN,
                RecordType::TXT,
            )
            .await
            .unwrap();

        assert!(!reply.truncated());
        assert_eq!(txt_len(&reply), TXT_CHUNKS * TXT_CHUNK_LEN);
    }

    #[tokio::test]
    async fn test_non_query_opcode_is_not_implemented() {
        let (_socket, upstream) = silent_upstream().await;
        let handler = handler(upstream, Duration::from_secs(1)).await;
        let mut notify = query("api.example.com.", RecordType::SOA);
        notify.set_op_code(OpCode::Notify);

        let captured = CapturedResponse::default();
        handler.handle_request(&request(&notify), captured.clone()).await;

        let reply = captured.message();
        assert_eq!(reply.id(), 7);
        assert_eq!(reply.response_code(), ResponseCode::NotImp);
    }

    #[tokio::test]
    async fn test_queries_beyond_capacity_are_servfail() {
        let forwarder = Forwarder::connect(echo_upstream().await, Duration::from_secs(2))
            .await
            .unwrap();
        let handler = RewriteHandler::with_capacity(rewriter(), forwarder, 0);

        let captured = CapturedResponse::default();
        handler
            .handle_request(
                &request(&query("api.example.com.", RecordType::A)),
                captured.clone(),
            )
            .await;

        let reply = captured.message();
        assert_eq!(reply.response_code(), ResponseCode::ServFail);
        assert!(reply.answers().is_empty());
    }

    #[tokio::test]
    async fn test_handler_reply_keeps_question_case() {
        let handler = handler(echo_upstream().await, Duration::from_secs(2)).await;

        let captured = CapturedResponse::default();
        handler
            .handle_request(
                &request(&query("API.example.COM.", RecordType::A)),
                captured.clone(),
            )
            .await;

        let reply = captured.message();
        assert_eq!(reply.response_code(), ResponseCode::NoError);
        assert_eq!(reply.queries()[0].name().to_ascii(), "API.example.COM.");
        assert_eq!(reply.answers()[0].name().to_ascii(), "API.example.COM.");
    }

    #[tokio::test]
    async fn test_server_answers_over_udp() {
        let listen = server(echo_upstream().await).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let packet = query("api.example.com.", RecordType::A).to_vec().unwrap();
        client.send_to(&packet, listen).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = Message::from_vec(&buf[..len]).unwrap();
        assert_eq!(reply.id(), 7);
        assert_eq!(reply.answers()[0].name().to_ascii(), "api.example.com.");
    }

    #[tokio::test]
    async fn test_server_answers_silent_upstream_with_servfail() {
        let (_socket, upstream) = silent_upstream().await;
        let forwarder = Forwarder::connect(upstream, Duration::from_millis(100))
            .await
            .unwrap();
        let server = DnsServer::bind("127.0.0.1:0".parse().unwrap(), rewriter(), forwarder)
            .await
            .unwrap();
        let listen = server.local_addr();
        tokio::spawn(server.run());

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let packet = query("api.example.com.", RecordType::A).to_vec().unwrap();
        client.send_to(&packet, listen).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = Message::from_vec(&buf[..len]).unwrap();
        assert_eq!(reply.response_code(), ResponseCode::ServFail);
        assert_eq!(reply.queries()[0].name().to_ascii(), "api.example.com.");
    }

    #[tokio::test]
    async fn test_server_serves_large_answer_over_tcp() {
        let listen = server(truncating_upstream().await).await;

        let mut stream = TcpStream::connect(listen).await.unwrap();
        write_framed(&mut stream, &query("api.example.com.", RecordType::TXT)).await;
        let reply = tokio::time::timeout(Duration::from_secs(5), read_framed(&mut stream))
            .await
            .unwrap();

        assert_eq!(reply.response_code(), ResponseCode::NoError);
        assert!(!reply.truncated());
        assert_eq!(reply.answers()[0].name().to_ascii(), "api.example.com.");
        assert_eq!(txt_len(&reply), TXT_CHUNKS * TXT_CHUNK_LEN);
    }
}
