use tcpconnect::{EventLoop, ReadResult};

use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");
    (listener, addr)
}

#[test]
fn empty_loop_returns_immediately() {
    let mut event_loop = EventLoop::new().unwrap();

    assert!(!event_loop.is_alive());
    assert!(!event_loop.run_once().unwrap());
    event_loop.run().unwrap();
}

#[test]
fn timers_fire_in_deadline_order() {
    let mut event_loop = EventLoop::new().unwrap();
    let fired = log();

    for (name, delay) in [("slow", 40), ("fast", 5), ("medium", 20)] {
        let fired = fired.clone();
        event_loop.timer_start(Duration::from_millis(delay), move |_| {
            fired.borrow_mut().push(name.to_string());
        });
    }

    let started = Instant::now();
    event_loop.run().unwrap();

    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(*fired.borrow(), ["fast", "medium", "slow"]);
    assert_eq!(event_loop.timer_count(), 0);
}

#[test]
fn stopped_timer_never_fires() {
    let mut event_loop = EventLoop::new().unwrap();
    let fired = log();

    let kept = fired.clone();
    event_loop.timer_start(Duration::from_millis(5), move |_| {
        kept.borrow_mut().push("kept".into());
    });

    let stopped = fired.clone();
    let timer = event_loop.timer_start(Duration::from_millis(1), move |_| {
        stopped.borrow_mut().push("stopped".into());
    });

    assert!(event_loop.timer_stop(timer));
    assert!(!event_loop.timer_stop(timer));

    event_loop.run().unwrap();
    assert_eq!(*fired.borrow(), ["kept"]);
}

#[test]
fn timer_callback_can_arm_another_timer() {
    let mut event_loop = EventLoop::new().unwrap();
    let fired = log();

    let outer = fired.clone();
    event_loop.timer_start(Duration::ZERO, move |ev| {
        outer.borrow_mut().push("first".into());
        let inner = outer.clone();
        ev.timer_start(Duration::from_millis(1), move |_| {
            inner.borrow_mut().push("second".into());
        });
    });

    event_loop.run().unwrap();
    assert_eq!(*fired.borrow(), ["first", "second"]);
}

#[test]
fn close_cancels_outstanding_requests_before_close_callback() {
    let (listener, addr) = listen();
    let mut event_loop = EventLoop::new().unwrap();
    let events = log();

    let handle = event_loop.tcp_open(&addr).unwrap();

    let connect_log = events.clone();
    event_loop
        .tcp_connect(handle, addr, move |_, result| {
            let err = result.expect_err("connect should be cancelled");
            assert_eq!(err.raw_os_error(), Some(libc::ECANCELED));
            connect_log.borrow_mut().push("connect".into());
        })
        .unwrap();

    let write_log = events.clone();
    event_loop
        .write(handle, b"never sent".to_vec(), move |_, result| {
            let err = result.expect_err("write should be cancelled");
            assert_eq!(err.raw_os_error(), Some(libc::ECANCELED));
            write_log.borrow_mut().push("write".into());
        })
        .unwrap();

    let close_log = events.clone();
    event_loop
        .close(handle, move |ev| {
            close_log.borrow_mut().push("close".into());
            assert_eq!(ev.handle_count(), 0);
        })
        .unwrap();

    // Closing is asynchronous: nothing has run yet.
    assert!(events.borrow().is_empty());
    assert_eq!(event_loop.handle_count(), 1);

    event_loop.run().unwrap();

    assert_eq!(*events.borrow(), ["connect", "write", "close"]);
    assert_eq!(event_loop.handle_count(), 0);

    drop(listener);
}

#[test]
fn operations_on_closed_handle_fail() {
    let (_listener, addr) = listen();
    let mut event_loop = EventLoop::new().unwrap();

    let handle = event_loop.tcp_open(&addr).unwrap();
    event_loop.close(handle, |_| {}).unwrap();

    let err = event_loop.write(handle, b"x".to_vec(), |_, _| {}).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    assert!(event_loop.close(handle, |_| {}).is_err());

    event_loop.run().unwrap();

    let err = event_loop.read_start(handle, |_, _| {}).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    assert_eq!(event_loop.peer_addr(handle), None);
}

#[test]
fn second_connect_is_rejected() {
    let (_listener, addr) = listen();
    let mut event_loop = EventLoop::new().unwrap();

    let handle = event_loop.tcp_open(&addr).unwrap();
    event_loop.tcp_connect(handle, addr, |_, _| {}).unwrap();

    let err = event_loop.tcp_connect(handle, addr, |_, _| {}).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EALREADY));
    assert_eq!(event_loop.peer_addr(handle), Some(addr));

    event_loop.close(handle, |_| {}).unwrap();
    event_loop.run().unwrap();
}

#[test]
fn connect_completes_on_a_later_iteration() {
    let (listener, addr) = listen();
    let mut event_loop = EventLoop::new().unwrap();
    let connected = Rc::new(RefCell::new(None));

    let handle = event_loop.tcp_open(&addr).unwrap();
    let result = connected.clone();
    event_loop
        .tcp_connect(handle, addr, move |_, outcome| {
            *result.borrow_mut() = Some(outcome.is_ok());
        })
        .unwrap();

    assert!(connected.borrow().is_none());

    while connected.borrow().is_none() {
        let alive = event_loop.run_once().unwrap();
        assert!(alive || connected.borrow().is_some());
    }
    assert_eq!(*connected.borrow(), Some(true));

    // An idle, connected handle does not keep the loop alive.
    assert!(!event_loop.is_alive());

    event_loop.close(handle, |_| {}).unwrap();
    event_loop.run().unwrap();
    drop(listener);
}

#[test]
fn reads_chunks_until_eof() {
    let (listener, addr) = listen();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("Failed to accept connection");
        let mut request = [0; 5];
        stream.read_exact(&mut request).unwrap();
        assert_eq!(&request, b"hello");
        stream.write_all(b"wor").unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(20));
        stream.write_all(b"ld").unwrap();
    });

    let mut event_loop = EventLoop::builder()
        .events_capacity(8)
        .read_chunk_size(2)
        .build()
        .unwrap();
    let received = Rc::new(RefCell::new(Vec::new()));
    let ended = Rc::new(RefCell::new(false));

    let handle = event_loop.tcp_open(&addr).unwrap();
    let (data, eof) = (received.clone(), ended.clone());
    event_loop
        .tcp_connect(handle, addr, move |ev, result| {
            result.unwrap();
            ev.write(handle, b"hello".to_vec(), |_, result| result.unwrap())
                .unwrap();
            ev.read_start(handle, move |ev, chunk| match chunk {
                ReadResult::Data(bytes) => {
                    assert!(bytes.len() <= 2);
                    data.borrow_mut().extend_from_slice(&bytes);
                }
                ReadResult::Eof => {
                    *eof.borrow_mut() = true;
                    ev.close(handle, |_| {}).unwrap();
                }
                ReadResult::Error(err) => panic!("read failed: {err}"),
            })
            .unwrap();
        })
        .unwrap();

    event_loop.run().unwrap();

    assert_eq!(received.borrow().as_slice(), b"world");
    assert!(*ended.borrow());
    assert_eq!(event_loop.handle_count(), 0);

    server.join().expect("Thread panicked");
}

#[test]
fn read_stop_drops_the_reader() {
    let (listener, addr) = listen();
    let mut event_loop = EventLoop::new().unwrap();

    let handle = event_loop.tcp_open(&addr).unwrap();
    event_loop.tcp_connect(handle, addr, |_, _| {}).unwrap();

    let marker = Rc::new(());
    let held = marker.clone();
    event_loop
        .read_start(handle, move |_, _| {
            let _ = &held;
        })
        .unwrap();
    assert_eq!(Rc::strong_count(&marker), 2);

    event_loop.read_stop(handle).unwrap();
    assert_eq!(Rc::strong_count(&marker), 1);

    event_loop.close(handle, |_| {}).unwrap();
    event_loop.run().unwrap();
    drop(listener);
}
