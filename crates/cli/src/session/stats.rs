//! Session statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::ConsumerStatsAggregator;

/// Statistics from a dispatcher session
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Events injected by the scripted source (notifications and resyncs)
    pub events_sent: u64,

    /// Topics that were registered successfully
    pub registered_topics: usize,

    /// Total duration of the session
    pub duration: Duration,

    /// Dispatcher counters at shutdown
    pub dispatcher: MetricsSnapshot,

    /// What the consumers observed, merged across topics
    pub consumers: ConsumerStatsAggregator,
}

impl SessionStats {
    /// Consumer wake-ups per second
    pub fn wakeups_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.consumers.total_wakeups as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of routed notifications that were absorbed by a pending condition
    pub fn coalesce_rate(&self) -> f64 {
        let routed = self.dispatcher.delivered_count + self.dispatcher.coalesced_count;
        if routed > 0 {
            (self.dispatcher.coalesced_count as f64 / routed as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Session Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Topics: {}", self.registered_topics);
        println!("   ├─ Events sent: {}", self.events_sent);
        println!("   └─ Wake-ups/s: {:.2}", self.wakeups_per_sec());

        let d = &self.dispatcher;
        println!("\n📈 Dispatcher");
        println!("   ├─ Delivered: {}", d.delivered_count);
        println!(
            "   ├─ Coalesced: {} ({:.2}%)",
            d.coalesced_count,
            self.coalesce_rate()
        );
        println!("   ├─ Unroutable: {}", d.unroutable_count);
        println!("   ├─ Resync broadcasts: {}", d.broadcast_count);
        println!("   ├─ Keepalive timeouts: {}", d.keepalive_count);
        println!("   └─ Probe failures: {}", d.probe_failure_count);

        println!("\n{}", self.consumers.summary());
    }
}
