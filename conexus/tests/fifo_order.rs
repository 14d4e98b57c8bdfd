#[cfg(test)]
mod tests {
    use conexus::aio::Aio;
    use conexus::net::TcpConn;
    use conexus::reactor::Reactor;

    use proptest::prelude::*;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Whatever the mix of write sizes, the peer sees the accepted
        /// bytes of each write in submission order.
        #[test]
        fn prop_writes_arrive_in_submission_order(
            sizes in prop::collection::vec(1usize..4096, 1..8)
        ) {
            let reactor = Reactor::new().expect("Failed to start reactor");
            let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
            let addr = listener.local_addr().expect("Failed to get local address");

            let client = TcpStream::connect(addr).expect("Failed to connect to listener");
            let (mut peer, _) = listener.accept().expect("Failed to accept connection");
            peer.set_read_timeout(Some(Duration::from_secs(5)))
                .expect("Failed to set read timeout");

            let conn = TcpConn::from_stream(&reactor.handle(), client)
                .expect("Failed to register connection");
            conn.start(true, false);

            let payloads: Vec<Vec<u8>> = sizes
                .iter()
                .enumerate()
                .map(|(i, &len)| vec![i as u8; len])
                .collect();

            let aios: Vec<Aio> = payloads
                .iter()
                .map(|payload| {
                    let aio = Aio::new();
                    aio.set_iov(vec![payload.clone()]).expect("Failed to set buffers");
                    aio
                })
                .collect();

            for aio in &aios {
                conn.send(aio);
            }

            let mut expected = Vec::new();
            for (aio, payload) in aios.iter().zip(&payloads) {
                let n = aio.wait().expect("Write failed");
                prop_assert!(n <= payload.len());
                expected.extend_from_slice(&payload[..n]);
            }

            let mut received = vec![0; expected.len()];
            peer.read_exact(&mut received).expect("Failed to read from peer");
            prop_assert_eq!(received, expected);
        }
    }
}
