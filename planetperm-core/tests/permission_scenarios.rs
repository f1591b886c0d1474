//! End-to-end permission scenarios through the public API
//!
//! Run with: cargo test --test permission_scenarios

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use planetperm_core::cache::InvalidationBus;
use planetperm_core::config::PermissionCacheConfig;
use planetperm_core::models::{
    CategoryPermissions, Channel, ChannelId, ChannelType, ChatChannelPermissions, MemberId, NodeId,
    PermissionBits, PermissionsNode, Planet, PlanetId, PlanetMember, PlanetPermissions, PlanetRole,
    PlanetSnapshot, RoleId, RoleMembership, UserId,
};
use planetperm_core::repository::{MemoryRepository, PermissionRepository};
use planetperm_core::{Error, InvalidationMessage, PermissionService, Result};

const PLANET: PlanetId = PlanetId(7);
const OWNER: UserId = UserId(1);

const EVERYONE: RoleId = RoleId(100);
const MEMBER: RoleId = RoleId(101);
const ADMIN: RoleId = RoleId(102);

const GENERAL: ChannelId = ChannelId(1);
const C42: ChannelId = ChannelId(42);
const CATEGORY: ChannelId = ChannelId(50);
const SYNCED: ChannelId = ChannelId(51);

const CHAT: ChannelType = ChannelType::PlanetChat;
const VIEW: u64 = ChatChannelPermissions::VIEW;

fn role(id: RoleId, flag_bit_index: u8, position: u32) -> PlanetRole {
    PlanetRole {
        id,
        planet_id: PLANET,
        name: format!("role-{id}"),
        position,
        is_admin: false,
        is_default: false,
        flag_bit_index,
        permissions: 0,
        chat_permissions: 0,
        category_permissions: 0,
        voice_permissions: 0,
    }
}

fn channel(id: ChannelId, channel_type: ChannelType, position: u32) -> Channel {
    Channel {
        id,
        planet_id: PLANET,
        name: format!("channel-{id}"),
        channel_type,
        parent_id: None,
        inherits_perms: false,
        is_default: false,
        position,
    }
}

fn node(node_id: i64, role_id: RoleId, target_id: ChannelId, code: u64, mask: u64) -> PermissionsNode {
    PermissionsNode {
        id: NodeId(node_id),
        planet_id: PLANET,
        role_id,
        target_id,
        target_type: CHAT,
        code,
        mask,
    }
}

/// "Everyone" denies chat View by default; "Member" is granted View on C42
fn snapshot() -> PlanetSnapshot {
    let everyone = PlanetRole {
        name: "Everyone".to_string(),
        permissions: PlanetPermissions::DEFAULT,
        chat_permissions: ChatChannelPermissions::DEFAULT & !VIEW,
        category_permissions: CategoryPermissions::DEFAULT,
        ..role(EVERYONE, 0, u32::MAX)
    };
    let member = PlanetRole {
        name: "Member".to_string(),
        permissions: PlanetPermissions::INVITE,
        ..role(MEMBER, 1, 1)
    };
    let admin = PlanetRole {
        name: "Admin".to_string(),
        is_admin: true,
        ..role(ADMIN, 2, 0)
    };

    PlanetSnapshot {
        planet: Planet {
            id: PLANET,
            name: "scenario".to_string(),
            owner_id: OWNER,
            default_role_id: Some(EVERYONE),
        },
        roles: vec![everyone, member, admin],
        channels: vec![
            Channel { is_default: true, ..channel(GENERAL, CHAT, 0) },
            channel(C42, CHAT, 1),
            channel(CATEGORY, ChannelType::PlanetCategory, 2),
            Channel {
                parent_id: Some(CATEGORY),
                inherits_perms: true,
                ..channel(SYNCED, CHAT, 3)
            },
        ],
    }
}

fn repository() -> Arc<MemoryRepository> {
    let repo = MemoryRepository::new();
    repo.insert_planet(snapshot());
    repo.upsert_node(node(1, MEMBER, C42, VIEW, VIEW));
    Arc::new(repo)
}

fn service_with(repo: Arc<dyn PermissionRepository>, config: PermissionCacheConfig) -> PermissionService {
    PermissionService::new(repo, config)
}

fn service(repo: &Arc<MemoryRepository>) -> PermissionService {
    service_with(repo.clone(), PermissionCacheConfig::default())
}

fn member(user_id: i64, bits: &[usize]) -> PlanetMember {
    PlanetMember {
        id: MemberId(user_id),
        user_id: UserId(user_id),
        planet_id: PLANET,
        role_membership: RoleMembership::from_role_indices(bits.iter().copied()),
    }
}

fn nobody() -> PlanetMember {
    member(2, &[])
}

fn with_member_role() -> PlanetMember {
    member(3, &[1])
}

fn with_admin_role() -> PlanetMember {
    member(4, &[2])
}

fn owner() -> PlanetMember {
    member(OWNER.0, &[])
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// ----------------------------------------------------------------------
// Repositories with instrumentation
// ----------------------------------------------------------------------

/// Counts node lookups and delays each one
struct CountingRepository {
    inner: Arc<MemoryRepository>,
    node_lookups: AtomicUsize,
    delay: Duration,
}

#[async_trait]
impl PermissionRepository for CountingRepository {
    async fn load_planet(&self, planet_id: PlanetId) -> Result<Option<PlanetSnapshot>> {
        self.inner.load_planet(planet_id).await
    }

    async fn get_member(&self, member_id: MemberId) -> Result<Option<PlanetMember>> {
        self.inner.get_member(member_id).await
    }

    async fn get_nodes(
        &self,
        target_id: ChannelId,
        target_type: ChannelType,
        role_ids: &[RoleId],
    ) -> Result<Vec<PermissionsNode>> {
        self.node_lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.get_nodes(target_id, target_type, role_ids).await
    }
}

/// Holds the first node lookup until released
struct GatedRepository {
    inner: Arc<MemoryRepository>,
    gated: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl PermissionRepository for GatedRepository {
    async fn load_planet(&self, planet_id: PlanetId) -> Result<Option<PlanetSnapshot>> {
        self.inner.load_planet(planet_id).await
    }

    async fn get_member(&self, member_id: MemberId) -> Result<Option<PlanetMember>> {
        self.inner.get_member(member_id).await
    }

    async fn get_nodes(
        &self,
        target_id: ChannelId,
        target_type: ChannelType,
        role_ids: &[RoleId],
    ) -> Result<Vec<PermissionsNode>> {
        // read before parking: the result reflects storage at call time
        let nodes = self.inner.get_nodes(target_id, target_type, role_ids).await;
        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        nodes
    }
}

/// Fails node lookups while `down` is set
struct FlakyRepository {
    inner: Arc<MemoryRepository>,
    down: AtomicBool,
}

#[async_trait]
impl PermissionRepository for FlakyRepository {
    async fn load_planet(&self, planet_id: PlanetId) -> Result<Option<PlanetSnapshot>> {
        self.inner.load_planet(planet_id).await
    }

    async fn get_member(&self, member_id: MemberId) -> Result<Option<PlanetMember>> {
        self.inner.get_member(member_id).await
    }

    async fn get_nodes(
        &self,
        target_id: ChannelId,
        target_type: ChannelType,
        role_ids: &[RoleId],
    ) -> Result<Vec<PermissionsNode>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::DataAccess("database unavailable".to_string()));
        }
        self.inner.get_nodes(target_id, target_type, role_ids).await
    }
}

// ----------------------------------------------------------------------
// Resolution
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_member_sees_c42_and_nobody_does_not() {
    let repo = repository();
    let service = service(&repo);

    assert!(service.has_channel_permission(&with_member_role(), C42, CHAT, VIEW).await.unwrap());
    assert!(!service.has_channel_permission(&nobody(), C42, CHAT, VIEW).await.unwrap());
    // the default role still grants its other chat defaults
    assert!(service
        .has_channel_permission(&nobody(), C42, CHAT, ChatChannelPermissions::POST_MESSAGES)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_results_are_deterministic() {
    let repo = repository();
    let first = service(&repo);
    let second = service(&repo);

    for member in [nobody(), with_member_role(), with_admin_role(), owner()] {
        for channel_id in [GENERAL, C42, CATEGORY, SYNCED, ChannelId(999)] {
            let cold = first.get_channel_permissions(&member, channel_id, CHAT).await.unwrap();
            let warm = first.get_channel_permissions(&member, channel_id, CHAT).await.unwrap();
            let other = second.get_channel_permissions(&member, channel_id, CHAT).await.unwrap();
            assert_eq!(cold, warm);
            assert_eq!(cold, other);
        }
    }
}

#[tokio::test]
async fn test_undefined_everywhere_is_denied() {
    let repo = MemoryRepository::new();
    let mut planet = snapshot();
    planet.planet.default_role_id = None;
    planet.roles.retain(|r| r.id == MEMBER);
    repo.insert_planet(planet);
    let service = service_with(Arc::new(repo), PermissionCacheConfig::default());

    // bit 9 has no role behind it
    let member = member(3, &[1, 9]);
    assert_eq!(service.get_channel_permissions(&member, C42, CHAT).await.unwrap(), 0);
    assert_eq!(
        service
            .get_channel_permissions(&member, CATEGORY, ChannelType::PlanetCategory)
            .await
            .unwrap(),
        0
    );
    assert!(!service.has_channel_permission(&member, ChannelId(404), CHAT, VIEW).await.unwrap());
}

#[tokio::test]
async fn test_authority_ordering() {
    let repo = repository();
    let service = service(&repo);

    let owner = service.get_authority(&owner()).await.unwrap();
    let admin = service.get_authority(&with_admin_role()).await.unwrap();
    let member = service.get_authority(&with_member_role()).await.unwrap();
    let none = service.get_authority(&member_no_bits()).await.unwrap();

    assert_eq!(owner, u32::MAX);
    assert!(owner > admin);
    assert!(admin > member);
    assert!(member > none);
    assert_eq!(none, 0);
}

fn member_no_bits() -> PlanetMember {
    member(5, &[])
}

#[tokio::test]
async fn test_admin_bypasses_explicit_deny() {
    let repo = repository();
    repo.upsert_node(node(2, ADMIN, C42, 0, u64::MAX));
    let service = service(&repo);

    let admin = with_admin_role();
    assert_eq!(
        service.get_channel_permissions(&admin, C42, CHAT).await.unwrap(),
        PermissionBits::FULL_CONTROL
    );
    assert!(service
        .has_planet_permission(&admin, PlanetPermissions::MANAGE_ROLES)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_owner_bypasses_everything_without_roles() {
    let repo = repository();
    repo.upsert_node(node(3, EVERYONE, C42, 0, u64::MAX));
    let service = service(&repo);
    let owner = owner();

    assert!(service
        .has_channel_permission(&owner, C42, CHAT, ChatChannelPermissions::MANAGE_MESSAGES)
        .await
        .unwrap());
    assert!(service.has_planet_permission(&owner, PlanetPermissions::BAN).await.unwrap());

    let visible = service.get_visible_channels(&owner).await.unwrap();
    assert_eq!(visible.ids(), &[GENERAL, C42, CATEGORY, SYNCED]);
}

#[tokio::test]
async fn test_planet_permissions_include_default_role() {
    let repo = repository();
    let service = service(&repo);

    let bits = service.get_planet_permissions(&with_member_role()).await.unwrap();
    assert_eq!(bits, PlanetPermissions::DEFAULT | PlanetPermissions::INVITE);
    assert!(service
        .has_planet_permission(&nobody(), PlanetPermissions::VIEW)
        .await
        .unwrap());
    assert!(!service
        .has_planet_permission(&nobody(), PlanetPermissions::INVITE)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_inheriting_channel_uses_category_nodes() {
    let repo = repository();
    let service = service(&repo);
    let member = with_member_role();

    assert!(!service.has_channel_permission(&member, SYNCED, CHAT, VIEW).await.unwrap());

    let grant = node(4, MEMBER, CATEGORY, VIEW, VIEW);
    repo.upsert_node(grant.clone());
    service.apply_invalidation(&InvalidationMessage::NodeChanged { node: grant });

    assert!(service.has_channel_permission(&member, SYNCED, CHAT, VIEW).await.unwrap());
    assert!(service.has_channel_access(&member, SYNCED).await.unwrap());
}

// ----------------------------------------------------------------------
// Channel access
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_visible_channels_per_role() {
    let repo = repository();
    let service = service(&repo);

    let visible = service.get_visible_channels(&nobody()).await.unwrap();
    assert_eq!(visible.ids(), &[GENERAL, CATEGORY]);

    let visible = service.get_visible_channels(&with_member_role()).await.unwrap();
    assert_eq!(visible.ids(), &[GENERAL, C42, CATEGORY]);
    assert!(visible.contains(C42));
    assert!(!visible.contains(SYNCED));

    let visible = service.get_visible_channels(&with_admin_role()).await.unwrap();
    assert_eq!(visible.len(), 4);
}

#[tokio::test]
async fn test_visible_channels_follow_channel_changes() {
    let repo = repository();
    let service = service(&repo);
    let member = with_member_role();
    assert!(service.has_channel_access(&member, C42).await.unwrap());

    // move C42 under the category and let it inherit
    let moved = Channel {
        parent_id: Some(CATEGORY),
        inherits_perms: true,
        ..channel(C42, CHAT, 1)
    };
    repo.upsert_channel(moved.clone()).unwrap();
    service.handle_channel_change(&moved);

    assert!(!service.has_channel_access(&member, C42).await.unwrap());
    assert!(!service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap());

    let created = channel(ChannelId(60), ChannelType::PlanetVoice, 9);
    repo.upsert_channel(created.clone()).unwrap();
    service.handle_channel_change(&created);
    let visible = service.get_visible_channels(&nobody()).await.unwrap();
    assert_eq!(visible.ids(), &[GENERAL, CATEGORY]);

    repo.remove_channel(PLANET, CATEGORY);
    service.handle_channel_deleted(PLANET, CATEGORY);
    let visible = service.get_visible_channels(&with_admin_role()).await.unwrap();
    assert_eq!(visible.ids(), &[GENERAL, C42, SYNCED, ChannelId(60)]);
    // the category is gone, so its inheritors resolve to deny
    assert_eq!(service.get_channel_permissions(&member, SYNCED, CHAT).await.unwrap(), 0);
}

// ----------------------------------------------------------------------
// Invalidation
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_role_deleted_revokes_its_grants() {
    let repo = repository();
    let service = service(&repo);
    let member = with_member_role();
    assert!(service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap());

    repo.remove_role(PLANET, MEMBER);
    service.handle_role_deleted(PLANET, MEMBER);

    // a stale membership still carrying the bit resolves without the role
    assert!(!service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap());
    assert_eq!(service.get_authority(&member).await.unwrap(), 0);
}

#[tokio::test]
async fn test_role_order_change_reranks_authority() {
    let repo = repository();
    let service = service(&repo);
    let admin = service.get_authority(&with_admin_role()).await.unwrap();
    let member = service.get_authority(&with_member_role()).await.unwrap();
    assert!(admin > member);

    service.handle_role_order_change(PLANET, &[MEMBER, ADMIN, EVERYONE]);

    let admin = service.get_authority(&with_admin_role()).await.unwrap();
    let member = service.get_authority(&with_member_role()).await.unwrap();
    assert!(member > admin);
}

#[tokio::test]
async fn test_default_role_change_moves_fallback() {
    let repo = repository();
    let service = service(&repo);
    let nobody = nobody();
    assert!(service
        .has_channel_permission(&nobody, C42, CHAT, ChatChannelPermissions::POST_MESSAGES)
        .await
        .unwrap());

    service.handle_default_role_change(PLANET, None);
    assert_eq!(service.get_channel_permissions(&nobody, C42, CHAT).await.unwrap(), 0);
    assert_eq!(
        service.get_planet_permissions(&nobody).await.unwrap(),
        PlanetPermissions::VIEW
    );
}

#[tokio::test]
async fn test_role_edit_applies_new_base_permissions() {
    let repo = repository();
    let service = service(&repo);
    let nobody = nobody();
    assert!(!service.has_channel_permission(&nobody, C42, CHAT, VIEW).await.unwrap());

    let mut everyone = snapshot().roles.remove(0);
    everyone.chat_permissions |= VIEW;
    repo.upsert_role(everyone.clone()).unwrap();
    service.handle_role_change(&everyone);

    assert!(service.has_channel_permission(&nobody, C42, CHAT, VIEW).await.unwrap());
}

#[tokio::test]
async fn test_stale_computation_is_not_cached() {
    let memory = repository();
    let gated = Arc::new(GatedRepository {
        inner: memory.clone(),
        gated: AtomicBool::new(true),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let service = service_with(gated.clone(), PermissionCacheConfig::default());
    let member = with_member_role();

    let query = {
        let service = service.clone();
        tokio::spawn(async move { service.get_channel_permissions(&member, C42, CHAT).await })
    };
    gated.entered.notified().await;

    // revoke while the query holds the old nodes
    let revoke = node(1, MEMBER, C42, 0, VIEW);
    memory.upsert_node(revoke.clone());
    service.handle_node_change(&revoke);
    gated.release.notify_one();

    let stale = query.await.unwrap().unwrap();
    assert!(stale & VIEW != 0);

    let hosted = service.hosted(PLANET).await.unwrap().unwrap();
    assert_eq!(
        hosted.cache().get_channel_permissions(CHAT, &member.role_membership, C42),
        None
    );
    assert!(!service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_see_final_state() {
    let repo = repository();
    let service = service(&repo);
    let member = with_member_role();

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    service.get_channel_permissions(&member, C42, CHAT).await.unwrap();
                    service.get_visible_channels(&member).await.unwrap();
                }
            })
        })
        .collect();

    for i in 0..100 {
        let code = if i % 2 == 0 { 0 } else { VIEW };
        let changed = node(1, MEMBER, C42, code, VIEW);
        repo.upsert_node(changed.clone());
        service.handle_node_change(&changed);
        tokio::task::yield_now().await;
    }
    for reader in readers {
        reader.await.unwrap();
    }

    // last write granted View
    assert!(service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap());
    assert!(service.has_channel_access(&member, C42).await.unwrap());

    let revoke = node(1, MEMBER, C42, 0, VIEW);
    repo.upsert_node(revoke.clone());
    service.handle_node_change(&revoke);
    assert!(!service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap());
    assert!(!service.has_channel_access(&member, C42).await.unwrap());
}

#[tokio::test]
async fn test_data_errors_are_returned_and_not_cached() {
    let flaky = Arc::new(FlakyRepository {
        inner: repository(),
        down: AtomicBool::new(true),
    });
    let service = service_with(flaky.clone(), PermissionCacheConfig::default());
    let member = with_member_role();

    let err = service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap_err();
    assert!(err.is_data_access());
    assert!(service.get_visible_channels(&member).await.is_err());

    flaky.down.store(false, Ordering::SeqCst);
    assert!(service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap());
    assert!(service.has_channel_access(&member, C42).await.unwrap());
}

#[tokio::test]
async fn test_member_lookup_by_id() {
    let repo = repository();
    repo.upsert_member(with_member_role());
    let service = service(&repo);

    assert!(service
        .has_channel_permission_for_member(MemberId(3), C42, CHAT, VIEW)
        .await
        .unwrap());
    assert!(!service
        .has_channel_permission_for_member(MemberId(77), GENERAL, CHAT, VIEW)
        .await
        .unwrap());
    assert_eq!(
        service.get_visible_channels_for_member(MemberId(3)).await.unwrap().ids(),
        &[GENERAL, C42, CATEGORY]
    );
    assert!(service.get_authority_for_member(MemberId(3)).await.unwrap() > 0);
}

// ----------------------------------------------------------------------
// Single-flight
// ----------------------------------------------------------------------

async fn concurrent_cold_lookups(single_flight: bool) -> usize {
    let counting = Arc::new(CountingRepository {
        inner: repository(),
        node_lookups: AtomicUsize::new(0),
        delay: Duration::from_millis(30),
    });
    let config = PermissionCacheConfig {
        single_flight,
        ..PermissionCacheConfig::default()
    };
    let service = service_with(counting.clone(), config);
    service.hosted(PLANET).await.unwrap();

    let member = with_member_role();
    let results = join_all((0..10).map(|_| service.get_channel_permissions(&member, C42, CHAT))).await;
    for result in results {
        assert!(result.unwrap() & VIEW != 0);
    }
    counting.node_lookups.load(Ordering::SeqCst)
}

#[tokio::test]
async fn test_single_flight_shares_cold_computation() {
    assert_eq!(concurrent_cold_lookups(true).await, 1);
}

#[tokio::test]
async fn test_without_single_flight_each_miss_computes() {
    assert_eq!(concurrent_cold_lookups(false).await, 10);
}

// ----------------------------------------------------------------------
// Event bus
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_listener_applies_published_events() {
    let repo = repository();
    let service = service(&repo);
    let bus = InvalidationBus::default();
    let listener = service.start_invalidation_listener(&bus);
    let member = with_member_role();
    assert!(service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap());

    let revoke = node(1, MEMBER, C42, 0, VIEW);
    repo.upsert_node(revoke.clone());
    // events may arrive serialized from another node
    let wire = serde_json::to_string(&InvalidationMessage::NodeChanged { node: revoke }).unwrap();
    let message: InvalidationMessage = serde_json::from_str(&wire).unwrap();
    assert_eq!(bus.publish(message), 1);

    wait_until(|| {
        let service = service.clone();
        async move { !service.has_channel_permission(&member, C42, CHAT, VIEW).await.unwrap() }
    })
    .await;

    drop(bus);
    listener.await.unwrap();
}

#[tokio::test]
async fn test_ownership_transfer_reaches_listener() {
    let repo = repository();
    let service = service(&repo);
    let bus = InvalidationBus::default();
    let _listener = service.start_invalidation_listener(&bus);
    let previous_owner = owner();
    let next_owner = with_member_role();

    assert!(service.has_planet_permission(&previous_owner, PlanetPermissions::BAN).await.unwrap());
    assert!(!service.has_planet_permission(&next_owner, PlanetPermissions::BAN).await.unwrap());

    let transferred = Planet {
        owner_id: next_owner.user_id,
        ..snapshot().planet
    };
    repo.update_planet(transferred.clone()).unwrap();
    bus.publish(InvalidationMessage::PlanetChanged { planet: transferred });

    wait_until(|| {
        let service = service.clone();
        async move { !service.has_planet_permission(&previous_owner, PlanetPermissions::BAN).await.unwrap() }
    })
    .await;

    assert!(!service.has_channel_permission(&previous_owner, C42, CHAT, VIEW).await.unwrap());
    assert_eq!(service.get_authority(&previous_owner).await.unwrap(), 0);
    assert!(service.has_planet_permission(&next_owner, PlanetPermissions::BAN).await.unwrap());
    assert_eq!(service.get_authority(&next_owner).await.unwrap(), u32::MAX);
    // the planet stayed hosted
    assert_eq!(service.hosted_count(), 1);
}

#[tokio::test]
async fn test_lagged_listener_drops_hosted_planets() {
    let repo = repository();
    let service = service(&repo);
    let bus = InvalidationBus::new(1);
    let _listener = service.start_invalidation_listener(&bus);

    service.get_authority(&with_member_role()).await.unwrap();
    assert_eq!(service.hosted_count(), 1);

    for _ in 0..4 {
        bus.publish(InvalidationMessage::NodeChanged {
            node: node(1, MEMBER, C42, VIEW, VIEW),
        });
    }

    wait_until(|| {
        let service = service.clone();
        async move { service.hosted_count() == 0 }
    })
    .await;

    // reloads on demand
    assert!(service.has_channel_permission(&with_member_role(), C42, CHAT, VIEW).await.unwrap());
    assert_eq!(service.hosted_count(), 1);
}
