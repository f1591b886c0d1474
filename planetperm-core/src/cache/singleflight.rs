//! Shared cold computations
//!
//! With single-flight enabled, concurrent misses for the same permission
//! share one resolution instead of each querying the repository. Flights are
//! keyed by the cache generation the caller observed, so a caller never joins
//! a computation that started before an invalidation it has already seen.
//!
//! Only the computation is shared. Every caller commits the result itself
//! under its own generation.

use async_singleflight::Group;
use std::future::Future;
use tracing::warn;

use super::ChannelAccessSnapshot;
use crate::models::{ChannelId, ChannelType, PlanetId, RoleMembership};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ChannelFlight {
    planet_id: PlanetId,
    combo: RoleMembership,
    target_id: ChannelId,
    target_type: ChannelType,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AccessFlight {
    planet_id: PlanetId,
    combo: RoleMembership,
    generation: u64,
}

/// In-flight permission computations, one group per surface
pub struct PermissionFlights {
    channel: Group<ChannelFlight, u64, Error>,
    access: Group<AccessFlight, ChannelAccessSnapshot, Error>,
}

impl PermissionFlights {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channel: Group::new(),
            access: Group::new(),
        }
    }

    /// Bits of `combo` on `target_id`, computed once for every caller that
    /// observed `generation`
    pub async fn channel_permissions<F>(
        &self,
        planet_id: PlanetId,
        combo: RoleMembership,
        target_id: ChannelId,
        target_type: ChannelType,
        generation: u64,
        compute: F,
    ) -> Result<u64>
    where
        F: Future<Output = Result<u64>> + Send,
    {
        let key = ChannelFlight {
            planet_id,
            combo,
            target_id,
            target_type,
            generation,
        };
        settle(target_type.as_str(), self.channel.work(&key, compute).await)
    }

    /// Visible channels of `combo`, computed once for every caller that
    /// observed `generation`
    pub async fn channel_access<F>(
        &self,
        planet_id: PlanetId,
        combo: RoleMembership,
        generation: u64,
        compute: F,
    ) -> Result<ChannelAccessSnapshot>
    where
        F: Future<Output = Result<ChannelAccessSnapshot>> + Send,
    {
        let key = AccessFlight {
            planet_id,
            combo,
            generation,
        };
        settle("access", self.access.work(&key, compute).await)
    }
}

impl Default for PermissionFlights {
    fn default() -> Self {
        Self::new()
    }
}

/// `Err(None)` means the leader was dropped before it produced a result
fn settle<T>(surface: &'static str, outcome: std::result::Result<T, Option<Error>>) -> Result<T> {
    outcome.map_err(|err| {
        err.unwrap_or_else(|| {
            warn!(surface, "Permission computation leader dropped, failing its waiters");
            Error::Internal("permission computation leader failed".to_string())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    const PLANET: PlanetId = PlanetId(1);
    const CHAT: ChannelType = ChannelType::PlanetChat;

    #[tokio::test]
    async fn test_concurrent_resolutions_share_one_computation() {
        let flights = Arc::new(PermissionFlights::new());
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..10 {
            let flights = flights.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .channel_permissions(PLANET, RoleMembership::DEFAULT, ChannelId(42), CHAT, 0, async move {
                        sleep(Duration::from_millis(50)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(0b111)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 0b111);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generations_and_channel_types_do_not_share() {
        let flights = Arc::new(PermissionFlights::new());
        let counter = Arc::new(AtomicU32::new(0));

        let keys = [
            (CHAT, 0),
            (CHAT, 1),
            (ChannelType::PlanetVoice, 0),
        ];
        let mut handles = vec![];
        for (target_type, generation) in keys {
            let flights = flights.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .channel_permissions(
                        PLANET,
                        RoleMembership::DEFAULT,
                        ChannelId(1),
                        target_type,
                        generation,
                        async move {
                            sleep(Duration::from_millis(20)).await;
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(generation)
                        },
                    )
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_error_is_not_remembered() {
        let flights = PermissionFlights::new();

        let err = flights
            .channel_access(PLANET, RoleMembership::DEFAULT, 0, async {
                Err(Error::DataAccess("down".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, Error::DataAccess("down".to_string()));

        let snapshot = flights
            .channel_access(PLANET, RoleMembership::DEFAULT, 0, async {
                Ok(ChannelAccessSnapshot::from_ordered(&[ChannelId(3)]))
            })
            .await
            .unwrap();
        assert!(snapshot.contains(ChannelId(3)));
    }

    #[test]
    fn test_dropped_leader_becomes_internal_error() {
        let err = settle::<u64>("chat", Err(None)).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        let err = settle::<u64>("chat", Err(Some(Error::NotFound("role".to_string())))).unwrap_err();
        assert_eq!(err, Error::NotFound("role".to_string()));
    }
}
