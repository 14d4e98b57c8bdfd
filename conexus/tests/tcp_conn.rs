#[cfg(test)]
mod tests {
    use conexus::aio::Aio;
    use conexus::net::TcpConn;
    use conexus::reactor::Reactor;
    use conexus::{Error, MAX_IOV};

    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsRawFd;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, mpsc};
    use std::thread;
    use std::time::Duration;

    /// Returns a started connection and the raw peer socket at its other end.
    fn pair(reactor: &Reactor) -> (TcpConn, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");

        let client = TcpStream::connect(addr).expect("Failed to connect to listener");
        let (peer, _) = listener.accept().expect("Failed to accept connection");
        peer.set_read_timeout(Some(Duration::from_secs(5)))
            .expect("Failed to set read timeout");

        let conn =
            TcpConn::from_stream(&reactor.handle(), client).expect("Failed to register connection");
        conn.start(true, false);

        (conn, peer)
    }

    fn write_aio(bufs: &[&[u8]]) -> Aio {
        let aio = Aio::new();
        aio.set_iov(bufs.iter().map(|buf| buf.to_vec()).collect())
            .expect("Failed to set buffers");
        aio
    }

    fn read_aio(lens: &[usize]) -> Aio {
        let aio = Aio::new();
        aio.set_iov(lens.iter().map(|&len| vec![0; len]).collect())
            .expect("Failed to set buffers");
        aio
    }

    #[test]
    fn test_send_hello() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);

        let aio = write_aio(&[b"hello"]);
        conn.send(&aio);
        assert_eq!(aio.wait(), Ok(5));

        let mut buffer = [0; 5];
        peer.read_exact(&mut buffer)
            .expect("Failed to read from peer");
        assert_eq!(&buffer, b"hello");
    }

    #[test]
    fn test_recv_scatter() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);

        let aio = read_aio(&[2, 0, 4]);
        conn.recv(&aio);
        assert!(aio.is_busy());

        peer.write_all(b"abcdef").expect("Failed to write to peer");
        assert_eq!(aio.wait(), Ok(6));

        let bufs = aio.take_iov().expect("Failed to take buffers");
        assert_eq!(bufs, vec![b"ab".to_vec(), Vec::new(), b"cdef".to_vec()]);
    }

    #[test]
    fn test_writes_complete_in_order() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);
        let (tx, rx) = mpsc::channel();

        let words: [&[u8]; 3] = [b"one", b"two", b"three"];
        let aios: Vec<Aio> = words
            .iter()
            .enumerate()
            .map(|(i, word)| {
                let tx = tx.clone();
                let aio = Aio::with_callback(move |_| {
                    let _ = tx.send(i);
                });
                aio.set_iov(vec![word.to_vec()])
                    .expect("Failed to set buffers");
                aio
            })
            .collect();

        for aio in &aios {
            conn.send(aio);
        }

        let order: Vec<usize> = (0..3)
            .map(|_| {
                rx.recv_timeout(Duration::from_secs(5))
                    .expect("Write did not complete")
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2]);

        let mut buffer = [0; 11];
        peer.read_exact(&mut buffer)
            .expect("Failed to read from peer");
        assert_eq!(&buffer, b"onetwothree");
    }

    #[test]
    fn test_reads_complete_in_order() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);

        let first = read_aio(&[3]);
        let second = read_aio(&[3]);
        conn.recv(&first);
        conn.recv(&second);
        assert_eq!(conn.pending(), (2, 0));

        peer.write_all(b"abcdef").expect("Failed to write to peer");

        assert_eq!(first.wait(), Ok(3));
        assert_eq!(second.wait(), Ok(3));
        assert_eq!(first.take_iov().unwrap(), vec![b"abc".to_vec()]);
        assert_eq!(second.take_iov().unwrap(), vec![b"def".to_vec()]);
    }

    #[test]
    fn test_peer_close_fails_read() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, peer) = pair(&reactor);

        let aio = read_aio(&[16]);
        conn.recv(&aio);
        drop(peer);

        assert_eq!(aio.wait(), Err(Error::Closed));
    }

    #[test]
    fn test_close_fails_pending_operations() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, _peer) = pair(&reactor);

        let reads: Vec<Aio> = (0..3).map(|_| read_aio(&[8])).collect();
        for aio in &reads {
            conn.recv(aio);
        }

        // The peer never reads, so the send buffer eventually fills and a
        // write stays queued.
        let chunk = vec![0x5a; 1 << 20];
        let mut stuck = None;
        for _ in 0..256 {
            let aio = write_aio(&[chunk.as_slice()]);
            conn.send(&aio);
            if aio.is_busy() {
                stuck = Some(aio);
                break;
            }
        }
        let stuck = stuck.expect("Send buffer never filled");

        let queued: Vec<Aio> = (0..2).map(|_| write_aio(&[b"late"])).collect();
        for aio in &queued {
            conn.send(aio);
        }
        assert_eq!(conn.pending(), (3, 3));

        conn.close();
        assert!(conn.is_closed());
        assert_eq!(conn.pending(), (0, 0));

        for aio in reads.iter().chain(Some(&stuck)).chain(&queued) {
            assert_eq!(aio.wait(), Err(Error::Closed));
        }

        let after = write_aio(&[b"x"]);
        conn.send(&after);
        assert_eq!(after.wait(), Err(Error::Closed));

        // Idempotent.
        conn.close();
    }

    /// Closes `stream` with a zero linger timeout, so the other end sees a
    /// reset instead of an orderly shutdown.
    fn reset(stream: TcpStream) {
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };
        let rc = unsafe {
            libc::setsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                &linger as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, 0, "Failed to set SO_LINGER");
        drop(stream);
    }

    #[test]
    fn test_drop_fails_pending_read() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, _peer) = pair(&reactor);

        let aio = read_aio(&[8]);
        conn.recv(&aio);
        conn.finalize();

        assert_eq!(aio.wait(), Err(Error::Closed));
    }

    #[test]
    fn test_too_many_buffers_rejected() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);

        let aio = Aio::new();
        aio.set_iov(vec![vec![b'z']; MAX_IOV + 1])
            .expect("Failed to set buffers");
        conn.send(&aio);
        assert_eq!(aio.wait(), Err(Error::InvalidArgument));

        let ok = write_aio(&[b"ok"]);
        conn.send(&ok);
        assert_eq!(ok.wait(), Ok(2));

        let mut buffer = [0; 2];
        peer.read_exact(&mut buffer)
            .expect("Failed to read from peer");
        assert_eq!(&buffer, b"ok");
    }

    #[test]
    fn test_max_buffers_accepted() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);

        let aio = Aio::new();
        aio.set_iov(vec![vec![b'z']; MAX_IOV])
            .expect("Failed to set buffers");
        conn.send(&aio);
        assert_eq!(aio.wait(), Ok(MAX_IOV));

        let mut buffer = [0; MAX_IOV];
        peer.read_exact(&mut buffer)
            .expect("Failed to read from peer");
        assert!(buffer.iter().all(|&b| b == b'z'));
    }

    #[test]
    fn test_empty_buffers_skipped() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);

        let aio = write_aio(&[b"ab", b"", b"cd"]);
        conn.send(&aio);
        assert_eq!(aio.wait(), Ok(4));

        let mut buffer = [0; 4];
        peer.read_exact(&mut buffer)
            .expect("Failed to read from peer");
        assert_eq!(&buffer, b"abcd");

        let nothing = write_aio(&[b"", b""]);
        conn.send(&nothing);
        assert_eq!(nothing.wait(), Ok(0));

        let empty_read = read_aio(&[0]);
        conn.recv(&empty_read);
        assert_eq!(empty_read.wait(), Ok(0));
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_resubmit_from_callback() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);
        let conn = Arc::new(conn);

        let rounds = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        let aio = {
            let conn = conn.clone();
            let rounds = rounds.clone();
            Aio::with_callback(move |aio| {
                if rounds.fetch_add(1, Ordering::SeqCst) < 2 {
                    conn.send(aio);
                } else {
                    let _ = tx.send(());
                }
            })
        };
        aio.set_iov(vec![b"x".to_vec()])
            .expect("Failed to set buffers");
        conn.send(&aio);

        rx.recv_timeout(Duration::from_secs(5))
            .expect("Callbacks did not finish");
        assert_eq!(rounds.load(Ordering::SeqCst), 3);

        let mut buffer = [0; 3];
        peer.read_exact(&mut buffer)
            .expect("Failed to read from peer");
        assert_eq!(&buffer, b"xxx");
    }

    #[test]
    fn test_busy_operation_not_resubmitted() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);

        let aio = read_aio(&[4]);
        conn.recv(&aio);
        conn.recv(&aio);
        assert_eq!(conn.pending(), (1, 0));

        peer.write_all(b"data").expect("Failed to write to peer");
        assert_eq!(aio.wait(), Ok(4));
    }

    #[test]
    fn test_two_connections_echo() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("Failed to accept connection");
            stream
        });
        let client = TcpStream::connect(addr).expect("Failed to connect to listener");
        let server = handle.join().expect("Thread panicked");

        let client = TcpConn::from_stream(&reactor.handle(), client)
            .expect("Failed to register connection");
        let server = TcpConn::from_stream(&reactor.handle(), server)
            .expect("Failed to register connection");
        client.start(true, false);
        server.start(true, false);

        for _ in 0..3 {
            let read = read_aio(&[4]);
            server.recv(&read);

            let write = write_aio(&[b"ping"]);
            client.send(&write);

            assert_eq!(write.wait(), Ok(4));
            assert_eq!(read.wait(), Ok(4));
            assert_eq!(read.take_iov().unwrap(), vec![b"ping".to_vec()]);
        }
    }

    #[test]
    fn test_peer_reset_closes_connection() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, peer) = pair(&reactor);

        let read = read_aio(&[8]);
        conn.recv(&read);

        let chunk = vec![0x5a; 1 << 20];
        let mut stuck = None;
        for _ in 0..256 {
            let aio = write_aio(&[chunk.as_slice()]);
            conn.send(&aio);
            if aio.is_busy() {
                stuck = Some(aio);
                break;
            }
        }
        let stuck = stuck.expect("Send buffer never filled");

        reset(peer);

        assert_eq!(read.wait_timeout(Duration::from_secs(5)), Err(Error::Closed));
        assert_eq!(stuck.wait_timeout(Duration::from_secs(5)), Err(Error::Closed));
        assert!(conn.is_closed());

        let after = read_aio(&[1]);
        conn.recv(&after);
        assert_eq!(after.wait(), Err(Error::Closed));
    }

    #[test]
    fn test_hard_error_fails_only_the_head() {
        let reactor = Reactor::new().expect("Failed to start reactor");
        let (conn, mut peer) = pair(&reactor);

        // One read served through readiness leaves the descriptor fully
        // disarmed, so the reset below is only seen by the next syscall.
        let warmup = read_aio(&[1]);
        conn.recv(&warmup);
        peer.write_all(b"w").expect("Failed to write to peer");
        assert_eq!(warmup.wait(), Ok(1));

        reset(peer);
        thread::sleep(Duration::from_millis(100));

        let first = write_aio(&[b"lost"]);
        conn.send(&first);
        let err = first.wait().expect_err("Write after reset succeeded");
        assert!(
            matches!(err, Error::ConnectionReset | Error::Closed),
            "unexpected error {err:?}"
        );
        assert!(!conn.is_closed());

        let second = write_aio(&[b"also lost"]);
        conn.send(&second);
        assert_eq!(second.wait(), Err(Error::Closed));
        assert!(!conn.is_closed());
        assert_eq!(conn.pending(), (0, 0));
    }
}
