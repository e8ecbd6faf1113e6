//! Damage resolution shared by gameplay calls and collision results.

use starfall_core::{DamageOutcome, EntityId, EntityPool};
use starfall_shared::SimEvent;
use tracing::trace;

/// Applies `amount` to `id` and publishes the consequences.
///
/// A kill releases the entity back to its pool and publishes
/// `EntityDestroyed` followed by `ScoreAwarded`; a survivable hit publishes
/// `EntityDamaged`. Unknown or already destroyed ids publish nothing.
pub fn resolve_damage(
    pool: &mut EntityPool,
    id: EntityId,
    amount: f32,
    events: &mut Vec<SimEvent>,
) -> DamageOutcome {
    let archetype = pool
        .archetype_of(id)
        .and_then(|a| pool.registry().get(a))
        .map(|t| t.name.clone())
        .unwrap_or_default();

    let outcome = pool.damage(id, amount);
    match outcome {
        DamageOutcome::Alive { health_remaining } => {
            events.push(SimEvent::EntityDamaged {
                entity_id: id.raw(),
                amount,
                health_remaining,
            });
        }
        DamageOutcome::Destroyed {
            point_value,
            position,
        } => {
            pool.release(id);
            trace!(entity = %id, %archetype, "entity destroyed");
            events.push(SimEvent::EntityDestroyed {
                entity_id: id.raw(),
                archetype,
                position,
            });
            events.push(SimEvent::ScoreAwarded {
                entity_id: id.raw(),
                points: point_value,
            });
        }
        DamageOutcome::NotFound => {}
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use starfall_core::{ArchetypeRegistry, SpawnOverrides};
    use starfall_shared::Vec3;

    #[test]
    fn test_kill_releases_and_scores() {
        let mut pool = EntityPool::new(ArchetypeRegistry::builtin());
        let id = pool
            .acquire_named("armored", SpawnOverrides::at(Vec3::new(5.0, 0.0, 5.0)))
            .unwrap();
        let mut events = Vec::new();

        let first = resolve_damage(&mut pool, id, 1.0, &mut events);
        assert_eq!(first, DamageOutcome::Alive { health_remaining: 1.0 });
        assert!(matches!(events[0], SimEvent::EntityDamaged { .. }));

        let second = resolve_damage(&mut pool, id, 1.0, &mut events);
        assert!(matches!(second, DamageOutcome::Destroyed { point_value: 15, .. }));
        assert!(pool.get(id).is_none());
        assert_eq!(pool.active_count(), 0);
        assert!(matches!(
            &events[1],
            SimEvent::EntityDestroyed { archetype, .. } if archetype == "armored"
        ));
        assert_eq!(events[2], SimEvent::ScoreAwarded { entity_id: id.raw(), points: 15 });

        assert_eq!(resolve_damage(&mut pool, id, 1.0, &mut events), DamageOutcome::NotFound);
        assert_eq!(events.len(), 3);
    }
}
