use tracing::trace;

// Trace-level counters under the `is24.metrics` target, e.g.
// `RUST_LOG=is24.metrics=trace`.

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target: "is24.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn listings_synced(owner: &str, published: usize, deleted: usize) {
    trace!(
        target: "is24.metrics",
        owner = owner,
        published = published as u64,
        deleted = deleted as u64,
        "listings_synced"
    );
}

#[cfg(test)]
pub(crate) mod capture {
    use std::sync::{Arc, Mutex};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer};

    /// Records the target of every event it sees.
    #[derive(Clone, Default)]
    pub struct Targets(pub Arc<Mutex<Vec<String>>>);

    impl Targets {
        pub fn seen(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl<S: Subscriber> Layer<S> for Targets {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0
                .lock()
                .unwrap()
                .push(event.metadata().target().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::capture::Targets;
    use super::*;
    use tracing_subscriber::{Registry, layer::SubscriberExt};

    #[test]
    fn events_carry_the_metrics_target() {
        let targets = Targets::default();
        let subscriber = Registry::default().with(targets.clone());
        tracing::subscriber::with_default(subscriber, || {
            stage_elapsed("fetch_list", 12);
            listings_synced("is24-source", 2, 1);
        });
        assert_eq!(targets.seen(), vec!["is24.metrics", "is24.metrics"]);
    }

    #[test]
    fn env_filter_selects_by_target() {
        use tracing_subscriber::EnvFilter;

        let targets = Targets::default();
        let subscriber = Registry::default()
            .with(EnvFilter::new("warn,is24.metrics=trace"))
            .with(targets.clone());
        tracing::subscriber::with_default(subscriber, || {
            stage_elapsed("diff", 3);
            tracing::debug!(target: "is24.pipeline", "filtered out");
        });
        assert_eq!(targets.seen(), vec!["is24.metrics"]);
    }
}
