//! Fixed-period sampling on virtual time.
//!
//! The scheduler is advanced by the same loop that steps physics, by the
//! simulated `dt`. Each subscription fires at most once per `advance`; periods
//! missed inside one large `dt` are coalesced.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription<O, F> {
    id: SubscriptionId,
    owner: O,
    name: &'static str,
    period: Duration,
    elapsed: Duration,
    callback: F,
}

pub struct SamplingScheduler<O, F> {
    now: Duration,
    next_id: u64,
    subscriptions: Vec<Subscription<O, F>>,
}

impl<O: Copy + PartialEq, F> Default for SamplingScheduler<O, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Copy + PartialEq, F> SamplingScheduler<O, F> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            subscriptions: Vec::new(),
        }
    }

    /// Virtual time accumulated so far.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn subscribe(&mut self, owner: O, name: &'static str, period: Duration, callback: F) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            owner,
            name,
            period: period.max(Duration::from_nanos(1)),
            elapsed: Duration::ZERO,
            callback,
        });
        id
    }

    pub fn cancel(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Drop every subscription of `owner`; returns how many were removed.
    pub fn cancel_owner(&mut self, owner: O) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.owner != owner);
        before - self.subscriptions.len()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn names_of(&self, owner: O) -> Vec<&'static str> {
        self.subscriptions
            .iter()
            .filter(|s| s.owner == owner)
            .map(|s| s.name)
            .collect()
    }

    /// Move virtual time forward and hand every due subscription to `fire`,
    /// in subscription order.
    pub fn advance(&mut self, dt: Duration, mut fire: impl FnMut(O, &mut F)) {
        self.now += dt;

        for sub in &mut self.subscriptions {
            sub.elapsed += dt;
            if sub.elapsed < sub.period {
                continue;
            }

            fire(sub.owner, &mut sub.callback);

            let rest = sub.elapsed.as_nanos() % sub.period.as_nanos();
            sub.elapsed = Duration::from_nanos(rest as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Counter = u32;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn fires_once_per_period() {
        let mut sched: SamplingScheduler<u8, Counter> = SamplingScheduler::new();
        sched.subscribe(1, "accel", ms(500), 0);

        let mut fired = 0;
        for _ in 0..60 {
            sched.advance(ms(16) + Duration::from_micros(667), |_, count| {
                *count += 1;
                fired += 1;
            });
        }
        // ~1.0 s of virtual time
        assert_eq!(fired, 2);
        assert!(sched.now() >= ms(1000));
    }

    #[test]
    fn large_step_coalesces_missed_periods() {
        let mut sched: SamplingScheduler<u8, Counter> = SamplingScheduler::new();
        sched.subscribe(1, "accel", ms(500), 0);

        let mut fired = 0;
        sched.advance(ms(1700), |_, _| fired += 1);
        assert_eq!(fired, 1);

        // 200 ms carried over, so 300 ms more is due
        sched.advance(ms(299), |_, _| fired += 1);
        assert_eq!(fired, 1);
        sched.advance(ms(1), |_, _| fired += 1);
        assert_eq!(fired, 2);
    }

    #[test]
    fn fires_in_subscription_order() {
        let mut sched: SamplingScheduler<u8, char> = SamplingScheduler::new();
        sched.subscribe(1, "a", ms(100), 'a');
        sched.subscribe(2, "b", ms(100), 'b');
        sched.subscribe(1, "c", ms(100), 'c');

        let mut seen = String::new();
        sched.advance(ms(100), |_, c| seen.push(*c));
        assert_eq!(seen, "abc");
    }

    #[test]
    fn cancelled_owner_never_fires_again() {
        let mut sched: SamplingScheduler<u8, Counter> = SamplingScheduler::new();
        sched.subscribe(1, "accel", ms(100), 0);
        sched.subscribe(1, "orientation", ms(100), 0);
        let keep = sched.subscribe(2, "accel", ms(100), 0);

        assert_eq!(sched.names_of(1), vec!["accel", "orientation"]);
        assert_eq!(sched.cancel_owner(1), 2);
        assert_eq!(sched.len(), 1);

        let mut owners = Vec::new();
        sched.advance(ms(100), |owner, _| owners.push(owner));
        assert_eq!(owners, vec![2]);

        assert!(sched.cancel(keep));
        assert!(!sched.cancel(keep));
        assert!(sched.is_empty());
    }
}
