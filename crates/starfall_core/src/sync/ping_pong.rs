//! # Ping-Pong Projectile Buffers
//!
//! Two equally sized [`ProjectileBuffer`]s. The main loop always writes to
//! `current`; the other one is either the idle spare or out on lease.

use tracing::{debug, warn};

use crate::error::{BufferError, BufferResult};
use crate::memory::ProjectileBuffer;

/// A buffer on loan to a worker.
///
/// Must come back through [`PingPongBuffers::reclaim`], even when the
/// worker's results are thrown away as stale.
#[derive(Debug)]
pub struct BufferLease {
    generation: u64,
    buffer: ProjectileBuffer,
}

impl BufferLease {
    /// Lease number, unique per exchange.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The lent projectiles, exactly as they were at lend time.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> &ProjectileBuffer {
        &self.buffer
    }
}

/// Ping-pong pair of projectile buffers.
pub struct PingPongBuffers {
    current: ProjectileBuffer,
    spare: Option<ProjectileBuffer>,
    outstanding: Option<u64>,
    generation: u64,
    reclaimed: u64,
}

impl PingPongBuffers {
    /// Allocates both buffers with `capacity` records each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            current: ProjectileBuffer::new(capacity),
            spare: Some(ProjectileBuffer::new(capacity)),
            outstanding: None,
            generation: 0,
            reclaimed: 0,
        }
    }

    /// The buffer the main loop reads and writes.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> &ProjectileBuffer {
        &self.current
    }

    /// Mutable access to the main loop's buffer.
    #[inline]
    pub fn current_mut(&mut self) -> &mut ProjectileBuffer {
        &mut self.current
    }

    /// Returns true while a lease is out.
    #[inline]
    #[must_use]
    pub const fn is_lent(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Number of leases returned so far.
    #[inline]
    #[must_use]
    pub const fn reclaimed(&self) -> u64 {
        self.reclaimed
    }

    /// Hands the current contents to a worker.
    ///
    /// The main loop keeps an identical copy as its new `current`, so it can
    /// go on allocating while the worker reads the lease.
    ///
    /// # Errors
    ///
    /// [`BufferError::InTransit`] if the previous lease has not come back.
    pub fn lend(&mut self) -> BufferResult<BufferLease> {
        let mut next = self.spare.take().ok_or(BufferError::InTransit)?;
        if let Err(err) = next.copy_from(&self.current) {
            self.spare = Some(next);
            return Err(err);
        }
        let outgoing = std::mem::replace(&mut self.current, next);

        self.generation += 1;
        self.outstanding = Some(self.generation);
        Ok(BufferLease {
            generation: self.generation,
            buffer: outgoing,
        })
    }

    /// Takes a lease back; its buffer becomes the spare.
    ///
    /// Returns `false` (and drops the buffer) for a lease that is not the
    /// outstanding one, such as one issued before [`abandon_lease`](Self::abandon_lease).
    pub fn reclaim(&mut self, lease: BufferLease) -> bool {
        if self.outstanding != Some(lease.generation) {
            debug!(generation = lease.generation, "ignoring foreign buffer lease");
            return false;
        }
        if lease.buffer.capacity() != self.current.capacity() {
            warn!(generation = lease.generation, "lease capacity changed, replacing spare");
            self.spare = Some(ProjectileBuffer::new(self.current.capacity()));
        } else {
            self.spare = Some(lease.buffer);
        }
        self.outstanding = None;
        self.reclaimed += 1;
        true
    }

    /// Gives up on the outstanding lease (its worker is gone) and allocates a
    /// replacement spare. A late return of the old lease is ignored.
    ///
    /// Returns `false` if no lease was out.
    pub fn abandon_lease(&mut self) -> bool {
        let Some(generation) = self.outstanding.take() else {
            return false;
        };
        warn!(generation, "buffer lease abandoned, allocating a new spare");
        self.spare = Some(ProjectileBuffer::new(self.current.capacity()));
        true
    }

    /// Clears both local buffers. A lease still out is overwritten on the
    /// next `lend`, so it needs no clearing.
    ///
    /// Returns the ids freed from `current`.
    pub fn clear_active(&mut self) -> Vec<u32> {
        if let Some(spare) = self.spare.as_mut() {
            spare.clear_active();
        }
        self.current.clear_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Projectile, ProjectileKey};
    use starfall_shared::{Color, MissileType, ProjectileFlags, Vec3, WeaponType};

    fn shot() -> Projectile {
        Projectile {
            id: 0,
            position: Vec3::ZERO,
            velocity: Vec3::Z,
            size: 6.0,
            damage: 1.0,
            rotation: [0.0, 0.0],
            color: Color::rgb(255, 255, 0),
            weapon: WeaponType::Blaster,
            missile: MissileType::Standard,
            flags: ProjectileFlags::NONE,
        }
    }

    #[test]
    fn test_lend_keeps_identical_copy() {
        let mut buffers = PingPongBuffers::new(8);
        buffers.current_mut().allocate(ProjectileKey::Numeric(1), &shot()).unwrap();
        buffers.current_mut().allocate(ProjectileKey::Numeric(2), &shot()).unwrap();

        let lease = buffers.lend().unwrap();
        assert_eq!(lease.buffer().as_bytes(), buffers.current().as_bytes());
        assert!(buffers.is_lent());

        // The main loop keeps mutating; the lease does not see it
        buffers.current_mut().deallocate(1);
        assert!(lease.buffer().contains(1));
        assert!(!buffers.current().contains(1));

        assert!(buffers.reclaim(lease));
        assert!(!buffers.is_lent());
        assert_eq!(buffers.reclaimed(), 1);
    }

    #[test]
    fn test_second_lend_is_backpressured() {
        let mut buffers = PingPongBuffers::new(4);
        let lease = buffers.lend().unwrap();
        assert_eq!(buffers.lend().unwrap_err(), BufferError::InTransit);

        assert!(buffers.reclaim(lease));
        let again = buffers.lend().unwrap();
        assert_eq!(again.generation(), 2);
    }

    #[test]
    fn test_stale_lease_rejected_after_abandon() {
        let mut buffers = PingPongBuffers::new(4);
        let lost = buffers.lend().unwrap();

        assert!(buffers.abandon_lease());
        assert!(!buffers.is_lent());
        assert!(!buffers.abandon_lease());

        let fresh = buffers.lend().unwrap();
        assert!(!buffers.reclaim(lost));
        assert!(buffers.is_lent());
        assert!(buffers.reclaim(fresh));
    }

    #[test]
    fn test_clear_active() {
        let mut buffers = PingPongBuffers::new(4);
        buffers.current_mut().allocate(ProjectileKey::Numeric(5), &shot()).unwrap();
        let lease = buffers.lend().unwrap();
        assert_eq!(buffers.clear_active(), vec![5]);
        assert!(buffers.reclaim(lease));

        let next = buffers.lend().unwrap();
        assert!(next.buffer().is_empty());
    }
}
