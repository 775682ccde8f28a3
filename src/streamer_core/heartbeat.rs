use crate::streamer_core::grpc_client::RequestSink;
use crate::streamer_core::subscription::{ping_request, HEARTBEAT_PING_ID};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Outcome of one keepalive attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    Sent,
    /// Write failed; the channel is left to its own error event.
    Failed,
    /// Bound channel is closed; the heartbeat must not fire again.
    ChannelGone,
}

/// Keepalive timer bound to one channel.
///
/// Owned by the session manager next to the channel it is bound to and
/// dropped together with it. It never rebinds itself.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Interval,
    period: Duration,
    sent: u64,
    failures: u64,
}

impl Heartbeat {
    /// Bind to a freshly opened channel and send the first ping right away.
    /// Later pings follow every `period` via [`Heartbeat::tick`].
    pub async fn start(period: Duration, sink: &mut dyn RequestSink) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut heartbeat = Self {
            interval,
            period,
            sent: 0,
            failures: 0,
        };

        log::info!("💓 Heartbeat bound (interval: {}ms)", period.as_millis());
        heartbeat.beat(sink).await;
        heartbeat
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    pub async fn beat(&mut self, sink: &mut dyn RequestSink) -> Beat {
        if sink.is_closed() {
            log::info!("💔 Heartbeat channel gone, stopping");
            return Beat::ChannelGone;
        }

        match sink.send(ping_request(HEARTBEAT_PING_ID)).await {
            Ok(()) => {
                self.sent += 1;
                log::debug!("💓 Ping #{} sent", self.sent);
                Beat::Sent
            }
            Err(e) => {
                self.failures += 1;
                log::error!("❌ Ping error: {}", e);
                if sink.is_closed() {
                    Beat::ChannelGone
                } else {
                    Beat::Failed
                }
            }
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn pings_sent(&self) -> u64 {
        self.sent
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer_core::grpc_client::TransportError;
    use async_trait::async_trait;
    use yellowstone_grpc_proto::geyser::SubscribeRequest;

    #[derive(Default)]
    struct RecordingSink {
        requests: Vec<(Instant, SubscribeRequest)>,
        closed: bool,
        fail_writes: bool,
    }

    #[async_trait]
    impl RequestSink for RecordingSink {
        async fn send(&mut self, request: SubscribeRequest) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            if self.fail_writes {
                return Err(TransportError::Write("broken pipe".to_string()));
            }
            self.requests.push((Instant::now(), request));
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_ping_at_bind_then_every_period() {
        let mut sink = RecordingSink::default();
        let start = Instant::now();

        let mut heartbeat = Heartbeat::start(Duration::from_millis(5_000), &mut sink).await;
        assert_eq!(heartbeat.period(), Duration::from_millis(5_000));
        assert_eq!(sink.requests.len(), 1);
        assert_eq!(sink.requests[0].0, start);

        for _ in 0..3 {
            heartbeat.tick().await;
            assert_eq!(heartbeat.beat(&mut sink).await, Beat::Sent);
        }

        let offsets: Vec<u128> = sink
            .requests
            .iter()
            .map(|(at, _)| (*at - start).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 5_000, 10_000, 15_000]);
        assert!(sink.requests.iter().all(|(_, r)| r.ping.is_some()));
        assert_eq!(heartbeat.pings_sent(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_stops_heartbeat() {
        let mut sink = RecordingSink::default();
        let mut heartbeat = Heartbeat::start(Duration::from_millis(5_000), &mut sink).await;

        sink.closed = true;
        heartbeat.tick().await;

        assert_eq!(heartbeat.beat(&mut sink).await, Beat::ChannelGone);
        assert_eq!(sink.requests.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_is_counted_not_fatal() {
        let mut sink = RecordingSink {
            fail_writes: true,
            ..Default::default()
        };
        let mut heartbeat = Heartbeat::start(Duration::from_millis(1_000), &mut sink).await;
        assert_eq!(heartbeat.failures(), 1);

        sink.fail_writes = false;
        heartbeat.tick().await;
        assert_eq!(heartbeat.beat(&mut sink).await, Beat::Sent);
        assert_eq!(heartbeat.failures(), 1);
        assert_eq!(heartbeat.pings_sent(), 1);
    }
}
