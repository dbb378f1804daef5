//! End-to-end tests for the feed pipeline: broker fan-out under concurrency,
//! event streams fed from a live reader, and the HTTP surface on top.

use sp_common::{DataPoint, Dimension};
use sp_core::aggregate;
use sp_core::publish::Broker;
use sp_core::server::AnalysisServer;
use sp_core::session::EventStream;
use std::io::{self, Cursor, Read};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const LONG: Duration = Duration::from_secs(30);

/// Reader fed over a channel; ends when the sender is dropped.
struct ChannelReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Cursor<Vec<u8>>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.pending.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            match self.rx.recv() {
                Ok(chunk) => self.pending = Cursor::new(chunk),
                Err(_) => return Ok(0),
            }
        }
    }
}

fn channel_reader() -> (Sender<Vec<u8>>, ChannelReader) {
    let (tx, rx) = mpsc::channel();
    (
        tx,
        ChannelReader {
            rx,
            pending: Cursor::new(Vec::new()),
        },
    )
}

fn line(id: u32, timestamp: u32, likes: u32, retweets: u32) -> Vec<u8> {
    format!(
        "data: {{\"tweet\":{{\"id\":{},\"timestamp\":{},\"likes\":{},\"retweets\":{}}}}}\n",
        id, timestamp, likes, retweets
    )
    .into_bytes()
}

fn wait_for_subscribers(stream: &EventStream, dimension: Dimension, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while stream.subscribers(dimension) < n {
        assert!(Instant::now() < deadline, "subscribers never attached");
        thread::sleep(Duration::from_millis(5));
    }
}

// ============================================================================
// Broker
// ============================================================================

#[test]
fn broker_concurrent_subscribers_see_publish_order() {
    let broker: Arc<Broker<u8, u32>> = Arc::new(Broker::with_capacity(4));
    let receivers: Vec<_> = (0..8).map(|_| broker.subscribe(&1)).collect();

    let readers: Vec<_> = receivers
        .into_iter()
        .map(|(rx, _cancel)| thread::spawn(move || rx.iter().collect::<Vec<u32>>()))
        .collect();

    let publisher = {
        let broker = Arc::clone(&broker);
        thread::spawn(move || {
            for i in 0..500 {
                broker.publish(&1, i);
            }
        })
    };
    publisher.join().unwrap();
    broker.close();

    let expected: Vec<u32> = (0..500).collect();
    for reader in readers {
        assert_eq!(reader.join().unwrap(), expected);
    }
}

#[test]
fn broker_topics_are_isolated() {
    let broker: Broker<Dimension, DataPoint> = Broker::new();
    let (likes, _c1) = broker.subscribe(&Dimension::Likes);
    let (comments, _c2) = broker.subscribe(&Dimension::Comments);

    broker.publish(&Dimension::Likes, DataPoint::new(1, 10));
    broker.publish(&Dimension::Comments, DataPoint::new(2, 20));
    broker.publish(&Dimension::Likes, DataPoint::new(3, 30));
    broker.close();

    assert_eq!(
        likes.iter().collect::<Vec<_>>(),
        vec![DataPoint::new(1, 10), DataPoint::new(3, 30)]
    );
    assert_eq!(comments.iter().collect::<Vec<_>>(), vec![DataPoint::new(2, 20)]);
}

#[test]
fn broker_dropped_receiver_does_not_stall_others() {
    let broker: Arc<Broker<u8, u32>> = Arc::new(Broker::with_capacity(1));
    let (slow, slow_cancel) = broker.subscribe(&0);
    let (fast, _fast_cancel) = broker.subscribe(&0);

    let publisher = {
        let broker = Arc::clone(&broker);
        thread::spawn(move || {
            for i in 0..200 {
                broker.publish(&0, i);
            }
            broker.close();
        })
    };

    // The slow subscriber never reads; dropping it unblocks delivery.
    thread::sleep(Duration::from_millis(20));
    drop(slow);

    assert_eq!(fast.iter().count(), 200);
    publisher.join().unwrap();
    slow_cancel.cancel();
    assert_eq!(broker.subscribers(&0), 0);
}

// ============================================================================
// EventStream
// ============================================================================

#[test]
fn concurrent_windows_on_different_dimensions() {
    let (tx, reader) = channel_reader();
    let stream = Arc::new(EventStream::new(16));
    stream.attach(reader).unwrap();

    let likes = {
        let stream = Arc::clone(&stream);
        thread::spawn(move || stream.gather(Dimension::Likes, LONG))
    };
    let retweets = {
        let stream = Arc::clone(&stream);
        thread::spawn(move || stream.gather(Dimension::Retweets, LONG))
    };
    wait_for_subscribers(&stream, Dimension::Likes, 1);
    wait_for_subscribers(&stream, Dimension::Retweets, 1);

    for i in 1..=10 {
        tx.send(line(i, 1_000 + i, i, 100 - i)).unwrap();
    }
    drop(tx);

    let likes = likes.join().unwrap();
    let retweets = retweets.join().unwrap();
    assert_eq!(likes.total_posts, 10);
    assert_eq!((likes.p50, likes.p90, likes.p99), (5, 9, 10));
    assert_eq!(retweets.total_posts, 10);
    assert_eq!(retweets.minimum_timestamp, 1_001);
    assert_eq!(retweets.maximum_timestamp, 1_010);
    assert_eq!(retweets.p99, 99);

    stream.join();
    assert!(stream.is_done());
    assert_eq!(stream.counters().events, 10);
}

#[test]
fn window_closes_on_duration_while_feed_stays_open() {
    let (tx, reader) = channel_reader();
    let stream = EventStream::new(16);
    stream.attach(reader).unwrap();

    let points = stream.listen_to(Dimension::Likes, Duration::from_millis(100));
    tx.send(line(1, 50, 7, 0)).unwrap();

    let started = Instant::now();
    let stats = aggregate::collect(points);
    assert!(started.elapsed() < LONG);
    assert!(!stream.is_done());
    assert!(stats.total_posts <= 1);

    drop(tx);
    assert!(stream.wait_timeout(Duration::from_secs(10)));
    assert!(stream.error().is_none());
}

#[test]
fn late_window_on_finished_stream_is_empty() {
    let stream = EventStream::open(Cursor::new(line(1, 1, 1, 1))).unwrap();
    stream.wait();

    let started = Instant::now();
    let stats = stream.gather(Dimension::Likes, LONG);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(stats.is_empty());
}

// ============================================================================
// HTTP
// ============================================================================

#[test]
fn analysis_endpoint_reports_live_window() {
    let (tx, reader) = channel_reader();
    let stream = Arc::new(EventStream::new(16));
    stream.attach(reader).unwrap();
    let server = AnalysisServer::start("127.0.0.1:0", Arc::clone(&stream)).unwrap();
    let url = format!(
        "http://{}/analysis?dimension=likes&duration=30s",
        server.addr()
    );

    let request = thread::spawn(move || ureq::get(&url).call().unwrap().into_string().unwrap());
    wait_for_subscribers(&stream, Dimension::Likes, 1);
    for i in 1..=100 {
        tx.send(line(i, 2_000 + i, i, 0)).unwrap();
    }
    drop(tx);

    let body: serde_json::Value = serde_json::from_str(&request.join().unwrap()).unwrap();
    assert_eq!(body["total_posts"], 100);
    assert_eq!(body["minimum_timestamp"], 2_001);
    assert_eq!(body["maximum_timestamp"], 2_100);
    assert_eq!(body["likes_p50"], 50);
    assert_eq!(body["likes_p90"], 90);
    assert_eq!(body["likes_p99"], 99);

    let health = ureq::get(&format!("http://{}/health", server.addr()))
        .call()
        .unwrap()
        .into_string()
        .unwrap();
    let health: serde_json::Value = serde_json::from_str(&health).unwrap();
    assert_eq!(health["counters"]["events"], 100);

    server.shutdown();
}

#[test]
fn analysis_endpoint_rejects_bad_requests() {
    let stream = Arc::new(EventStream::open(Cursor::new(Vec::new())).unwrap());
    let server = AnalysisServer::start("127.0.0.1:0", stream).unwrap();
    let base = format!("http://{}", server.addr());

    for query in [
        "dimension=likes",
        "duration=5s",
        "dimension=shares&duration=5s",
        "dimension=likes&duration=5 parsecs",
        "dimension=likes&duration=-5s",
    ] {
        match ureq::get(&format!("{}/analysis?{}", base, query)).call() {
            Err(ureq::Error::Status(400, response)) => {
                let body: serde_json::Value =
                    serde_json::from_str(&response.into_string().unwrap()).unwrap();
                assert_eq!(body["category"], "request", "query {}", query);
            }
            other => panic!("query {} answered {:?}", query, other.map(|r| r.status())),
        }
    }

    match ureq::post(&format!("{}/analysis", base)).call() {
        Err(ureq::Error::Status(404, _)) => {}
        other => panic!("POST answered {:?}", other.map(|r| r.status())),
    }

    server.shutdown();
}
