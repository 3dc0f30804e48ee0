//! # OOB Wire Protocol
//!
//! Two clients over real TCP against a full node runtime: the namespace
//! owner grants the second client publish rights, builds the chain and
//! subscribes; the second client publishes with the chain hash as its
//! primary access chain.

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::SocketAddr;
    use std::time::Duration;

    use bw_01_objects::PayloadObject;
    use bw_07_oob_adapter::{
        Command, Frame, FrameReader, FrameWriter, DEFAULT_MAX_FRAME_BYTES, PROTOCOL_VERSION,
    };
    use node_runtime::{NodeRuntime, RouterConfig};
    use shared_types::{PO_ACCESS_DOT, PO_ENTITY_WITH_KEY, PO_MESSAGE};
    use tokio::io::BufReader;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    struct WireClient {
        reader: FrameReader<BufReader<OwnedReadHalf>>,
        writer: FrameWriter<OwnedWriteHalf>,
        /// Frames read while waiting for a different seqno.
        pending: VecDeque<Frame>,
        next_seq: u32,
    }

    impl WireClient {
        async fn connect(addr: SocketAddr) -> Self {
            let (rd, wr) = TcpStream::connect(addr).await.unwrap().into_split();
            let mut reader = FrameReader::new(BufReader::new(rd), DEFAULT_MAX_FRAME_BYTES);
            let helo = reader.read_next().await.unwrap().unwrap();
            assert_eq!(helo.command(), Some(Command::Hello));
            assert_eq!(helo.text("version").unwrap(), Some(PROTOCOL_VERSION));
            Self {
                reader,
                writer: FrameWriter::new(wr),
                pending: VecDeque::new(),
                next_seq: 100,
            }
        }

        fn frame(&mut self, cmd: Command) -> Frame {
            self.next_seq += 1;
            Frame::new(cmd, self.next_seq)
        }

        async fn send(&mut self, frame: &Frame) {
            self.writer.write_frame(frame).await.unwrap();
        }

        /// Next frame for `seqno` of the given command.
        async fn expect(&mut self, seqno: u32, cmd: Command) -> Frame {
            if let Some(i) = self
                .pending
                .iter()
                .position(|f| f.seqno == seqno && f.command() == Some(cmd))
            {
                return self.pending.remove(i).unwrap();
            }
            loop {
                let f = timeout(WAIT, self.reader.read_next())
                    .await
                    .expect("frame within timeout")
                    .unwrap()
                    .expect("connection open");
                if f.seqno == seqno && f.command() == Some(cmd) {
                    return f;
                }
                self.pending.push_back(f);
            }
        }

        async fn call(&mut self, frame: Frame) -> Frame {
            let seq = frame.seqno;
            self.send(&frame).await;
            self.expect(seq, Command::Response).await
        }

        async fn call_ok(&mut self, frame: Frame) -> Frame {
            let r = self.call(frame).await;
            assert_eq!(
                r.text("status").unwrap(),
                Some("okay"),
                "error response: {:?}",
                r.text("reason").unwrap()
            );
            r
        }

        /// Make an entity, use it for this session and publish it.
        async fn become_new_entity(&mut self) -> String {
            let f = self.frame(Command::MakeEntity);
            let made = self.call_ok(f).await;
            let vk = made.text("vk").unwrap().unwrap().to_string();
            let blob = made.payload(PO_ENTITY_WITH_KEY).unwrap().clone();

            let mut sete = self.frame(Command::SetEntity);
            sete.add_payload_object(blob.clone());
            self.call_ok(sete).await;

            let mut pute = self.frame(Command::PutEntity);
            pute.add_payload_object(blob);
            self.call_ok(pute).await;
            vk
        }
    }

    async fn runtime() -> (NodeRuntime, SocketAddr) {
        let mut config = RouterConfig::default();
        config.oob.listen = "127.0.0.1:0".to_string();
        config.registry.block_interval_ms = 5;
        config.registry.confirmations = 1;
        let node = NodeRuntime::new(config).unwrap();
        let addr = node.start().await.unwrap();
        (node, addr)
    }

    #[tokio::test]
    async fn test_granted_publish_reaches_subscriber() {
        let (node, addr) = runtime().await;
        let mut owner = WireClient::connect(addr).await;
        let mut user = WireClient::connect(addr).await;
        let ns = owner.become_new_entity().await;
        let uvk = user.become_new_entity().await;

        let makd = owner
            .frame(Command::MakeDot)
            .header("uri", format!("{ns}/a/*"))
            .header("to", uvk.as_str())
            .header("accesspermissions", "P")
            .header("ttl", "0");
        let dot = owner.call_ok(makd).await;
        let dot_hash = dot.text("hash").unwrap().unwrap().to_string();
        let mut putd = owner.frame(Command::PutDot);
        putd.add_payload_object(dot.payload(PO_ACCESS_DOT).unwrap().clone());
        owner.call_ok(putd).await;

        let makc = owner
            .frame(Command::MakeChain)
            .header("dot", dot_hash.as_str());
        let chain = owner.call_ok(makc).await;
        let chain_hash = chain.text("hash").unwrap().unwrap().to_string();

        let subs = owner
            .frame(Command::Subscribe)
            .header("uri", format!("{ns}/a/*"));
        let sub_seq = subs.seqno;
        let sub = owner.call_ok(subs).await;
        assert_eq!(sub.text("finished").unwrap(), Some("false"));

        let mut publ = user
            .frame(Command::Publish)
            .header("uri", format!("{ns}/a/x"))
            .header("primary_access_chain", chain_hash.as_str());
        publ.add_payload_object(PayloadObject::new(0x4000_0000, b"over the wire".to_vec()));
        user.call_ok(publ).await;

        let delivered = owner.expect(sub_seq, Command::Result).await;
        assert!(delivered.payload(PO_MESSAGE).is_some());

        // The first DOT's suffix cannot cover the topic.
        let denied = user
            .frame(Command::Publish)
            .header("uri", format!("{ns}/b/x"))
            .header("primary_access_chain", chain_hash.as_str());
        let r = user.call(denied).await;
        assert_eq!(r.text("status").unwrap(), Some("error"));
        assert_eq!(r.text("code").unwrap(), Some("408"));
        assert_eq!(r.text("finished").unwrap(), Some("true"));

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_unpacked_subscription_carries_fields() {
        let (node, addr) = runtime().await;
        let mut c = WireClient::connect(addr).await;
        let ns = c.become_new_entity().await;

        let subs = c
            .frame(Command::Subscribe)
            .header("uri", format!("{ns}/t/+"))
            .header("unpack", "true");
        let sub_seq = subs.seqno;
        c.call_ok(subs).await;

        let mut publ = c.frame(Command::Publish).header("uri", format!("{ns}/t/1"));
        publ.add_payload_object(PayloadObject::new(0x4000_0000, b"21.5".to_vec()));
        c.call_ok(publ).await;

        let r = c.expect(sub_seq, Command::Result).await;
        assert_eq!(r.text("from").unwrap(), Some(ns.as_str()));
        assert_eq!(r.text("uri").unwrap(), Some(format!("{ns}/t/1").as_str()));
        assert_eq!(r.payload(0x4000_0000).unwrap().content, b"21.5");

        node.shutdown().await;
    }
}
