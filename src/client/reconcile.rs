//! Reconciliation against authoritative snapshots and render smoothing

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::game::constants::{
    BULLET_CORRECTION_DISTANCE, BULLET_CORRECTION_FACTOR, BULLET_SNAP_DISTANCE, LERP_FACTOR,
    SETTLE_EPSILON, SNAP_THRESHOLD,
};
use crate::game::entities::{BulletId, PlayerId};
use crate::util::geometry::{distance, lerp};
use crate::ws::protocol::{BulletView, PlayerView, SnapshotView};

use super::predictor::ClientPredictor;

/// What one reconciliation did to the predicted state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Pending moves dropped as acknowledged
    pub dropped: usize,
    /// Pending moves replayed on top of the server position
    pub replayed: usize,
    /// Distance between the old prediction and the corrected one
    pub error: f32,
}

/// How a smoothed position reached its target this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Settled,
    Lerped,
    Snapped,
}

/// A rendered position chasing a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothed {
    pub x: f32,
    pub y: f32,
}

impl Smoothed {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// One frame of exponential interpolation. Large errors and any
    /// non-finite component snap straight to the target.
    pub fn approach(&mut self, target_x: f32, target_y: f32) -> Motion {
        if !target_x.is_finite() || !target_y.is_finite() {
            return Motion::Settled;
        }

        let error = distance(self.x, self.y, target_x, target_y);
        if !error.is_finite() || error > SNAP_THRESHOLD {
            self.x = target_x;
            self.y = target_y;
            return Motion::Snapped;
        }
        if error == 0.0 {
            return Motion::Settled;
        }

        self.x = lerp(self.x, target_x, LERP_FACTOR);
        self.y = lerp(self.y, target_y, LERP_FACTOR);
        if (target_x - self.x).abs() < SETTLE_EPSILON {
            self.x = target_x;
        }
        if (target_y - self.y).abs() < SETTLE_EPSILON {
            self.y = target_y;
        }
        Motion::Lerped
    }
}

/// Another player's tank: interpolated only, never predicted
#[derive(Debug, Clone)]
pub struct RemoteTank {
    pub view: PlayerView,
    pub render: Smoothed,
}

impl RemoteTank {
    fn new(view: PlayerView) -> Self {
        Self {
            render: Smoothed::new(view.x, view.y),
            view,
        }
    }

    pub fn frame(&mut self) -> Motion {
        self.render.approach(self.view.x, self.view.y)
    }
}

/// Locally extrapolated bullet, corrected by each snapshot
#[derive(Debug, Clone)]
pub struct RemoteBullet {
    pub view: BulletView,
    pub x: f32,
    pub y: f32,
}

impl RemoteBullet {
    fn new(view: BulletView) -> Self {
        Self {
            x: view.x,
            y: view.y,
            view,
        }
    }

    /// Snap on large error, pull most of the way on moderate error, and
    /// leave small error alone so bullets never visibly slow down
    pub fn sync(&mut self, view: BulletView) {
        let error = distance(self.x, self.y, view.x, view.y);
        if !error.is_finite() || error > BULLET_SNAP_DISTANCE {
            self.x = view.x;
            self.y = view.y;
        } else if error > BULLET_CORRECTION_DISTANCE {
            self.x = lerp(self.x, view.x, BULLET_CORRECTION_FACTOR);
            self.y = lerp(self.y, view.y, BULLET_CORRECTION_FACTOR);
        }
        self.view = view;
    }

    pub fn frame(&mut self) {
        self.x += self.view.dx * self.view.speed;
        self.y += self.view.dy * self.view.speed;
    }
}

/// Applies snapshots to the local prediction and keeps every rendered
/// entity smoothed between them
#[derive(Debug, Clone)]
pub struct Reconciliator {
    local_id: PlayerId,
    render: Smoothed,
    remotes: HashMap<PlayerId, RemoteTank>,
    bullets: HashMap<BulletId, RemoteBullet>,
}

impl Reconciliator {
    pub fn new(local_id: PlayerId, x: f32, y: f32) -> Self {
        Self {
            local_id,
            render: Smoothed::new(x, y),
            remotes: HashMap::new(),
            bullets: HashMap::new(),
        }
    }

    /// Fold the server's view of the local tank into the prediction.
    ///
    /// Acknowledged moves are dropped and the rest replayed, in order, from
    /// the confirmed position. A non-finite confirmed position is rejected
    /// and the prediction kept as is.
    pub fn reconcile(
        predictor: &mut ClientPredictor,
        confirmed: &PlayerView,
    ) -> Option<Correction> {
        let dropped = predictor.discard_acknowledged(confirmed.last_processed_input_seq);
        predictor.set_speed(confirmed.speed);

        if !confirmed.x.is_finite() || !confirmed.y.is_finite() {
            warn!(
                seq = confirmed.last_processed_input_seq,
                "Non-finite authoritative position rejected"
            );
            return None;
        }

        let (old_x, old_y) = predictor.position();
        let (x, y) = predictor.replay_from(confirmed.x, confirmed.y);
        predictor.set_position(x, y);

        let correction = Correction {
            dropped,
            replayed: predictor.pending_len(),
            error: distance(old_x, old_y, x, y),
        };
        if !correction.error.is_finite() || correction.error > SNAP_THRESHOLD {
            debug!(
                error = correction.error,
                replayed = correction.replayed,
                evicted = predictor.evicted(),
                "Large prediction error"
            );
        }
        Some(correction)
    }

    /// Apply one snapshot: reconcile the local tank, refresh remote tanks,
    /// and resync bullets in view
    pub fn apply_snapshot(
        &mut self,
        predictor: &mut ClientPredictor,
        snapshot: &SnapshotView,
    ) -> Option<Correction> {
        let mut correction = None;

        self.remotes
            .retain(|id, _| snapshot.players.iter().any(|p| p.id == *id));
        for view in &snapshot.players {
            if view.id == self.local_id {
                correction = Self::reconcile(predictor, view);
                continue;
            }
            if !view.x.is_finite() || !view.y.is_finite() {
                continue;
            }
            match self.remotes.get_mut(&view.id) {
                Some(remote) => remote.view = view.clone(),
                None => {
                    self.remotes.insert(view.id, RemoteTank::new(view.clone()));
                }
            }
        }

        self.bullets
            .retain(|id, _| snapshot.bullets.iter().any(|b| b.id == *id));
        for view in &snapshot.bullets {
            if !view.x.is_finite() || !view.y.is_finite() {
                continue;
            }
            match self.bullets.get_mut(&view.id) {
                Some(bullet) => bullet.sync(view.clone()),
                None => {
                    self.bullets.insert(view.id, RemoteBullet::new(view.clone()));
                }
            }
        }

        correction
    }

    /// One rendered frame.
    ///
    /// The local tank eases toward the last server-confirmed position plus
    /// the replayed offset of still-unacknowledged moves, which is where
    /// `reconcile` left the predictor. Easing toward the bare confirmed
    /// position would drag the tank back by its own in-flight input every
    /// snapshot. Remote tanks ease toward their last confirmed positions.
    pub fn frame(&mut self, predictor: &ClientPredictor) -> Motion {
        let (x, y) = predictor.position();
        let motion = self.render.approach(x, y);
        for remote in self.remotes.values_mut() {
            remote.frame();
        }
        for bullet in self.bullets.values_mut() {
            bullet.frame();
        }
        motion
    }

    pub fn render_position(&self) -> (f32, f32) {
        (self.render.x, self.render.y)
    }

    pub fn remote(&self, id: PlayerId) -> Option<&RemoteTank> {
        self.remotes.get(&id)
    }

    pub fn bullets(&self) -> impl Iterator<Item = &RemoteBullet> {
        self.bullets.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::predictor::ControlKey;
    use crate::game::entities::{BuffTimers, BulletType, MoveKey, Owner, Slot};
    use crate::game::map::ArenaMap;
    use crate::game::movement::{self, Intent};
    use crate::util::geometry::Rect;
    use crate::ws::protocol::MapSize;
    use uuid::Uuid;

    fn view(id: PlayerId, x: f32, y: f32, ack: u32) -> PlayerView {
        PlayerView {
            id,
            slot: Slot::P1,
            x,
            y,
            width: 46.0,
            height: 46.0,
            last_dx: 0.0,
            last_dy: -1.0,
            speed: 2.5,
            health: 100.0,
            max_health: 100.0,
            shield: 0.0,
            bullet_type: BulletType::Normal,
            buffs: BuffTimers::default(),
            spawn_protection: 0,
            is_invisible: false,
            burning: false,
            last_processed_input_seq: ack,
        }
    }

    fn bullet(id: u64, x: f32, y: f32) -> BulletView {
        BulletView {
            id,
            x,
            y,
            dx: 1.0,
            dy: 0.0,
            speed: 12.5,
            kind: BulletType::Normal,
            width: 10.0,
            height: 10.0,
            owner: Owner::Turret(0),
            is_fragment: false,
        }
    }

    fn snapshot(players: Vec<PlayerView>, bullets: Vec<BulletView>) -> SnapshotView {
        SnapshotView {
            tick: 1,
            players,
            bullets,
            items: Vec::new(),
            turrets: Vec::new(),
            map: MapSize {
                width: 1200.0,
                height: 1200.0,
            },
            is_game_over: false,
            winner: None,
        }
    }

    /// Predictor whose pending queue holds moves tagged 42, 43 and 44
    fn predictor_with_pending(map: ArenaMap) -> ClientPredictor {
        let mut p = ClientPredictor::new(map, 100.0, 100.0, 41);
        p.key_down(ControlKey::Move(MoveKey::Right), 0);
        p.frame(0);
        p.frame(40);
        p.frame(80);
        p
    }

    #[test]
    fn local_render_target_is_confirmed_plus_replay() {
        let local = Uuid::new_v4();
        let mut p = predictor_with_pending(ArenaMap::from_walls(1200.0, 1200.0, Vec::new()));
        let mut r = Reconciliator::new(local, 100.0, 100.0);

        // Server pushed the tank to x=150 and has folded in seq 42 only
        r.apply_snapshot(&mut p, &snapshot(vec![view(local, 150.0, 100.0, 42)], Vec::new()))
            .unwrap();
        assert_eq!(r.frame(&p), Motion::Snapped);
        assert_eq!(r.render_position(), (150.0 + 2.0 * 2.5, 100.0));
    }

    #[test]
    fn acknowledged_inputs_dropped_rest_replayed() {
        let mut p = predictor_with_pending(ArenaMap::from_walls(1200.0, 1200.0, Vec::new()));
        let seqs: Vec<u32> = p.pending().map(|i| i.seq).collect();
        assert_eq!(seqs, vec![42, 43, 44]);

        let confirmed = view(Uuid::new_v4(), 102.5, 100.0, 42);
        let correction = Reconciliator::reconcile(&mut p, &confirmed).unwrap();

        let seqs: Vec<u32> = p.pending().map(|i| i.seq).collect();
        assert_eq!(seqs, vec![43, 44]);
        assert_eq!(correction.dropped, 1);
        assert_eq!(correction.replayed, 2);
        assert_eq!(p.position(), (107.5, 100.0));
        assert_eq!(correction.error, 0.0);
    }

    #[test]
    fn replay_is_deterministic() {
        let map = ArenaMap::from_walls(1200.0, 1200.0, vec![Rect::new(192.0, 90.0, 50.0, 50.0)]);
        let a = predictor_with_pending(map.clone());
        let b = predictor_with_pending(map.clone());

        assert_eq!(a.replay_from(150.0, 100.0), b.replay_from(150.0, 100.0));

        let mut manual = (150.0, 100.0);
        for _ in 0..3 {
            manual = movement::step(manual.0, manual.1, Intent { dx: 1.0, dy: 0.0 }, 2.5, &map);
        }
        assert_eq!(a.replay_from(150.0, 100.0), manual);
        // Second step would touch the wall and is reverted
        assert_eq!(manual, (152.5, 100.0));
    }

    #[test]
    fn non_finite_server_position_rejected() {
        let mut p = predictor_with_pending(ArenaMap::from_walls(1200.0, 1200.0, Vec::new()));
        let before = p.position();
        let confirmed = view(Uuid::new_v4(), f32::NAN, 100.0, 42);
        assert!(Reconciliator::reconcile(&mut p, &confirmed).is_none());
        assert_eq!(p.position(), before);
        assert_eq!(p.pending_len(), 2);
    }

    #[test]
    fn smoothing_lerps_settles_and_snaps() {
        let mut s = Smoothed::new(0.0, 0.0);
        assert_eq!(s.approach(10.0, 0.0), Motion::Lerped);
        assert_eq!(s, Smoothed::new(5.0, 0.0));

        let mut s = Smoothed::new(9.6, 0.0);
        s.approach(10.0, 0.0);
        assert_eq!(s, Smoothed::new(10.0, 0.0));
        assert_eq!(s.approach(10.0, 0.0), Motion::Settled);

        assert_eq!(s.approach(100.0, 0.0), Motion::Snapped);
        assert_eq!(s, Smoothed::new(100.0, 0.0));

        let mut broken = Smoothed::new(f32::NAN, 0.0);
        assert_eq!(broken.approach(3.0, 4.0), Motion::Snapped);
        assert_eq!(broken, Smoothed::new(3.0, 4.0));

        // A non-finite target never leaks into the rendered position
        assert_eq!(broken.approach(f32::INFINITY, 0.0), Motion::Settled);
        assert_eq!(broken, Smoothed::new(3.0, 4.0));
    }

    #[test]
    fn snapshot_drives_local_remote_and_bullets() {
        let local = Uuid::new_v4();
        let other = Uuid::new_v4();
        let open = ArenaMap::from_walls(1200.0, 1200.0, Vec::new());
        let mut p = ClientPredictor::new(open, 100.0, 100.0, 0);
        let mut r = Reconciliator::new(local, 100.0, 100.0);

        let snap = snapshot(
            vec![view(local, 100.0, 100.0, 0), view(other, 800.0, 800.0, 7)],
            vec![bullet(1, 300.0, 300.0)],
        );
        assert!(r.apply_snapshot(&mut p, &snap).is_some());
        assert_eq!(r.remote(other).unwrap().render, Smoothed::new(800.0, 800.0));
        assert!(r.remote(local).is_none());

        // Remote moved a little: interpolated, not predicted
        let snap = snapshot(
            vec![view(local, 100.0, 100.0, 0), view(other, 820.0, 800.0, 8)],
            vec![bullet(1, 312.5, 300.0)],
        );
        r.apply_snapshot(&mut p, &snap);
        r.frame(&p);
        assert_eq!(r.remote(other).unwrap().render, Smoothed::new(810.0, 800.0));

        // Pulled 85% toward the server, then extrapolated one frame
        let b = r.bullets().next().unwrap();
        assert!((b.x - 323.125).abs() < 1e-3);
        assert_eq!(b.y, 300.0);

        // Entities missing from the next snapshot are forgotten
        r.apply_snapshot(&mut p, &snapshot(vec![view(local, 100.0, 100.0, 0)], Vec::new()));
        assert!(r.remote(other).is_none());
        assert_eq!(r.bullets().count(), 0);
    }

    #[test]
    fn bullet_sync_thresholds() {
        let mut b = RemoteBullet::new(bullet(1, 0.0, 0.0));
        b.sync(bullet(1, 3.0, 0.0));
        assert_eq!(b.x, 0.0);

        b.sync(bullet(1, 20.0, 0.0));
        assert!((b.x - 17.0).abs() < 1e-4);

        b.sync(bullet(1, 200.0, 0.0));
        assert_eq!(b.x, 200.0);
    }

    #[test]
    fn render_eases_toward_prediction() {
        let local = Uuid::new_v4();
        let open = ArenaMap::from_walls(1200.0, 1200.0, Vec::new());
        let mut p = ClientPredictor::new(open, 100.0, 100.0, 0);
        let mut r = Reconciliator::new(local, 100.0, 100.0);

        p.key_down(ControlKey::Move(MoveKey::Right), 0);
        p.frame(0);
        assert_eq!(r.frame(&p), Motion::Lerped);
        assert_eq!(r.render_position(), (101.25, 100.0));

        p.set_position(400.0, 100.0);
        assert_eq!(r.frame(&p), Motion::Snapped);
        assert_eq!(r.render_position(), (400.0, 100.0));
    }
}
