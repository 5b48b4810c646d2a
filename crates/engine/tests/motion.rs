use approx::assert_abs_diff_eq;
use glam::DVec3;

use holo::motion::{
    CircularMotion, Direction, Easing, EllipticalMotion, LinearMotion, PathMotion, Playback,
    RandomMotion,
};
use holo::registry::Registry;
use holo::simulation::compute_frame;
use holo::{
    Animation, CoordinateMode, FormationTemplate, GroupId, Member, MemberOffset, MotionModel,
    Position, Relationship, TimeOrigin, TrackId,
};

fn at_zero(model: MotionModel) -> Animation {
    Animation::new(model)
        .unwrap()
        .with_origin(TimeOrigin::At(0.0))
}

#[test]
fn linear_sweep_across_the_room() {
    let sweep = LinearMotion::new(
        Position::cartesian(-10.0, 0.0, 1.5),
        Position::cartesian(10.0, 0.0, 1.5),
        4.0,
    );
    let animation = at_zero(MotionModel::Linear(sweep));

    let samples: Vec<f64> = [0.0, 1.0, 2.0, 3.0, 4.0, 10.0]
        .iter()
        .map(|&t| animation.evaluate_at(t).to_vec3().x)
        .collect();
    for (got, want) in samples.iter().zip([-10.0, -5.0, 0.0, 5.0, 10.0, 10.0]) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-9);
    }
}

#[test]
fn polar_sweep_takes_the_short_way_round() {
    let mut sweep = LinearMotion::new(
        Position::polar(170.0, 0.0, 2.0),
        Position::polar(-170.0, 0.0, 2.0),
        2.0,
    );
    sweep.easing = Easing::Linear;
    let animation = at_zero(MotionModel::Linear(sweep)).with_mode(CoordinateMode::Polar);

    let Position::Polar(mid) = animation.evaluate_at(1.0) else {
        panic!("expected polar output");
    };
    assert_abs_diff_eq!(mid.azimuth.abs(), 180.0, epsilon = 1e-9);
    assert_abs_diff_eq!(mid.distance, 2.0, epsilon = 1e-9);
}

#[test]
fn ping_pong_returns_to_start() {
    let mut sweep = LinearMotion::new(
        Position::cartesian(0.0, 0.0, 0.0),
        Position::cartesian(1.0, 0.0, 0.0),
        1.0,
    );
    sweep.playback = Playback::PingPong;
    let animation = at_zero(MotionModel::Linear(sweep));

    assert_abs_diff_eq!(animation.evaluate_at(1.5).to_vec3().x, 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(animation.evaluate_at(2.0).to_vec3().x, 0.0, epsilon = 1e-9);
}

#[test]
fn orbit_repeats_every_period() {
    let mut orbit = CircularMotion::new(DVec3::new(0.0, 0.0, 1.0), 3.0, 0.25);
    orbit.direction = Direction::CounterClockwise;
    orbit.tilt = 30.0;
    let model = MotionModel::Circular(orbit);
    let period = model.period().unwrap();
    let animation = at_zero(model);

    for t in [0.0, 0.7, 2.9] {
        let a = animation.evaluate_at(t).to_vec3();
        let b = animation.evaluate_at(t + period).to_vec3();
        assert_abs_diff_eq!(a.distance(b), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(a.distance(DVec3::new(0.0, 0.0, 1.0)), 3.0, epsilon = 1e-9);
    }
}

#[test]
fn ellipse_stays_within_its_radii() {
    let ellipse = EllipticalMotion::new(DVec3::ZERO, 4.0, 1.0, 0.5);
    let animation = at_zero(MotionModel::Elliptical(ellipse));

    for i in 0..40 {
        let p = animation.evaluate_at(i as f64 * 0.05).to_vec3();
        assert!(p.x.abs() <= 4.0 + 1e-9);
        assert!(p.y.abs() <= 1.0 + 1e-9);
    }
}

#[test]
fn random_motion_is_reproducible() {
    let random = RandomMotion::new(DVec3::ZERO, DVec3::new(2.0, 2.0, 0.5), 0.5, 42);
    let a = at_zero(MotionModel::RandomBounded(random.clone()));
    let b = at_zero(MotionModel::RandomBounded(random));

    for i in 0..20 {
        let t = i as f64 * 0.13;
        let (pa, pb) = (a.evaluate_at(t).to_vec3(), b.evaluate_at(t).to_vec3());
        assert_eq!(pa, pb);
        assert!(pa.x.abs() <= 2.0 + 1e-9 && pa.y.abs() <= 2.0 + 1e-9 && pa.z.abs() <= 0.5 + 1e-9);
    }
}

#[test]
fn custom_path_visits_every_point() {
    let points = vec![
        Position::cartesian(0.0, 0.0, 0.0),
        Position::cartesian(1.0, 0.0, 0.0),
        Position::cartesian(1.0, 1.0, 0.0),
    ];
    let path = PathMotion::new(points.clone(), 2.0);
    let animation = at_zero(MotionModel::CustomPath(path));

    for (i, point) in points.iter().enumerate() {
        let p = animation.evaluate_at(i as f64).to_vec3();
        assert_abs_diff_eq!(p.distance(point.to_vec3()), 0.0, epsilon = 1e-9);
    }
}

#[test]
fn rejected_parameter_leaves_animation_untouched() {
    let orbit = CircularMotion::new(DVec3::ZERO, 1.0, 1.0);
    let mut animation = at_zero(MotionModel::Circular(orbit));
    let before = animation.clone();

    assert!(animation.set_parameter("radius", (-1.0).into()).is_err());
    assert!(animation.set_parameter("warp", 1.0.into()).is_err());
    assert_eq!(animation, before);

    animation.set_parameter("radius", 2.0.into()).unwrap();
    assert_abs_diff_eq!(animation.evaluate_at(0.0).to_vec3().length(), 2.0, epsilon = 1e-9);
}

#[test]
fn ring_formation_follows_an_animated_leader() {
    let mut registry = Registry::new();
    for id in 1..=4 {
        registry
            .add_track(TrackId(id), format!("t{id}"), Position::default())
            .unwrap();
    }
    let lead = LinearMotion::new(
        Position::cartesian(0.0, 0.0, 0.0),
        Position::cartesian(8.0, 0.0, 0.0),
        8.0,
    );
    registry
        .attach_animation(TrackId(1), at_zero(MotionModel::Linear(lead)), 0.0)
        .unwrap();
    registry
        .add_group(
            GroupId(1),
            "ring",
            Relationship::LeaderFollower {
                leader: TrackId(1),
            },
        )
        .unwrap();
    for id in 2..=4 {
        registry
            .add_group_member(GroupId(1), Member::Track(TrackId(id)))
            .unwrap();
    }
    registry
        .set_formation(
            GroupId(1),
            Some(FormationTemplate::Ring {
                radius: 1.5,
                rotation: 0.0,
            }),
        )
        .unwrap();

    for t in [0.0, 2.0, 5.0] {
        let frame = compute_frame(&mut registry, t).unwrap();
        let leader = frame
            .positions
            .iter()
            .find(|p| p.track == TrackId(1))
            .unwrap()
            .position
            .to_vec3();
        assert_abs_diff_eq!(leader.x, t, epsilon = 1e-9);

        for p in frame.positions.iter().filter(|p| p.track != TrackId(1)) {
            assert_abs_diff_eq!(p.position.to_vec3().distance(leader), 1.5, epsilon = 1e-9);
        }
    }
}

#[test]
fn isobarycenter_is_preserved_with_fixed_offsets() {
    let mut registry = Registry::new();
    for id in 1..=3 {
        registry
            .add_track(
                TrackId(id),
                format!("t{id}"),
                Position::cartesian(id as f64, 2.0 * id as f64, 0.0),
            )
            .unwrap();
    }
    registry
        .add_group(GroupId(1), "cluster", Relationship::Isobarycentric)
        .unwrap();
    for id in 1..=3 {
        registry
            .add_group_member(GroupId(1), Member::Track(TrackId(id)))
            .unwrap();
        registry
            .set_member_offset(
                GroupId(1),
                Member::Track(TrackId(id)),
                MemberOffset::Fixed(DVec3::new(id as f64 * 3.0, 0.0, 1.0)),
                0.0,
            )
            .unwrap();
    }

    let frame = compute_frame(&mut registry, 0.0).unwrap();
    let mean = frame
        .positions
        .iter()
        .map(|p| p.position.to_vec3())
        .sum::<DVec3>()
        / frame.positions.len() as f64;
    // Natural isobarycenter of (1,2), (2,4), (3,6).
    assert_abs_diff_eq!(mean.x, 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(mean.y, 4.0, epsilon = 1e-9);
    assert_abs_diff_eq!(mean.z, 0.0, epsilon = 1e-9);
}
