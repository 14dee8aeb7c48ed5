use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::averaging::MeasuredTransform;
use crate::calibration::{CalibrationError, CalibrationSession, SweepPlan};
use crate::simulator::{SyntheticTendonRig, TendonRig};

const UNITS_TO_METER: f64 = 0.1;

fn test_output_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rs_dh_kinematics_{}_{}", label, std::process::id()))
}

/// One settling window of slightly noisy marker samples at the current bend.
fn collect_noisy_window(
    session: &mut CalibrationSession,
    rig: &SyntheticTendonRig,
    rng: &mut StdRng,
    samples: usize,
) {
    session.begin_window();
    for _ in 0..samples {
        let mut base = rig.base_marker();
        let mut tip = rig.tip_marker();
        for i in 0..3 {
            base.translation[i] += rng.gen_range(-1e-3..1e-3);
            tip.translation[i] += rng.gen_range(-1e-3..1e-3);
        }
        session.ingest_sample(base, tip, rig.bend_position());
    }
    session.commit_window().expect("commit window");
}

#[test]
fn test_sweep_fit_recovers_the_bend_law() {
    let mut rig = SyntheticTendonRig::new(1.0 / UNITS_TO_METER);
    let mut session = CalibrationSession::new(UNITS_TO_METER);
    let mut rng = StdRng::from_seed([3u8; 32]);

    let plan = SweepPlan {
        motor_min: -0.2,
        motor_max: 0.2,
        points: 21,
        repetitions: 1,
    };
    for &command in plan.commands().iter() {
        session.record_command(command);
        rig.command_bend(command);
        collect_noisy_window(&mut session, &rig, &mut rng, 25);
    }
    assert_eq!(session.sample_count(), 42);
    assert_eq!(session.command_count(), 42);

    let fit = session.fit().expect("fit");

    // The rig bends a 0.05 m segment by 4 radians per command unit, so at
    // command 0.1 the arc has angle 0.4 and radius 0.125.
    let angle = 0.4_f64;
    let radius = 0.05 / angle;
    let (position, thz) = fit.predict_tip(0.1);
    assert!((position[0] - radius * angle.sin()).abs() < 1e-3, "x: {}", position[0]);
    assert!(
        (position[1] - radius * (1.0 - angle.cos())).abs() < 1e-3,
        "y: {}", position[1]
    );
    assert!(position[2].abs() < 1e-3, "z: {}", position[2]);
    assert!((thz - angle).abs() < 1e-3, "thz: {}", thz);

    // At zero command the segment is straight ahead
    let (straight, thz_zero) = fit.predict_tip(0.0);
    assert!((straight[0] - 0.05).abs() < 1e-3);
    assert!(straight[1].abs() < 1e-3);
    assert!(thz_zero.abs() < 1e-3);

    // Derivative curves are functions of the bend angle. At angle zero the
    // bend rate is the gain, the lateral rate is twice the segment length
    // and the axial rate vanishes by symmetry.
    assert!((fit.derivative_curves.thz.value(0.0) - 4.0).abs() < 1e-2);
    assert!((fit.derivative_curves.y.value(0.0) - 0.1).abs() < 1e-2);
    assert!(fit.derivative_curves.x.value(0.0).abs() < 1e-2);
}

#[test]
fn test_session_save_load_round_trip() {
    let dir = test_output_dir("save_load");
    fs::create_dir_all(&dir).expect("create test dir");

    let mut rig = SyntheticTendonRig::new(1.0 / UNITS_TO_METER);
    let mut session = CalibrationSession::new(UNITS_TO_METER);
    let mut rng = StdRng::from_seed([5u8; 32]);

    for &command in [-0.2, -0.1, 0.0, 0.1, 0.2].iter() {
        session.record_command(command);
        rig.command_bend(command);
        collect_noisy_window(&mut session, &rig, &mut rng, 10);
    }
    session.set_zero_reference().expect("zero reference");
    session.save(&dir).expect("save");

    // The file inventory is fixed; reloading depends on these exact names.
    for name in [
        "base_transforms_measured_all.json",
        "tip_transforms_measured_all.json",
        "base_transforms_measured_avg.json",
        "tip_transforms_measured_avg.json",
        "base_zero_transform.json",
        "tip_zero_transform.json",
        "bend_motor_pos_all.json",
        "bend_motor_cmd_all.json",
    ] {
        assert!(dir.join(name).exists(), "{} was not written", name);
    }

    let reloaded = CalibrationSession::load(&dir, UNITS_TO_METER).expect("load");
    assert_eq!(reloaded.sample_count(), session.sample_count());
    assert_eq!(reloaded.command_count(), session.command_count());
    // serde_json with float_roundtrip keeps every f64 exact, so the
    // reloaded state is not merely close, it is identical.
    assert_eq!(reloaded.zero_offset(), session.zero_offset());

    let fit = session.fit().expect("fit");
    let refit = reloaded.fit().expect("fit after reload");
    assert_eq!(
        fit.tip_curves.x.coefficients(),
        refit.tip_curves.x.coefficients()
    );
    assert_eq!(
        fit.tip_curves.thz.coefficients(),
        refit.tip_curves.thz.coefficients()
    );
    assert_eq!(
        fit.derivative_curves.y.coefficients(),
        refit.derivative_curves.y.coefficients()
    );

    // Collection continues where the saved run left off
    let mut continued = reloaded;
    continued.record_command(0.15);
    rig.command_bend(0.15);
    collect_noisy_window(&mut continued, &rig, &mut rng, 10);
    assert_eq!(continued.sample_count(), session.sample_count() + 1);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_fit_reports_unevenly_trimmed_reload() {
    let dir = test_output_dir("trimmed_reload");
    fs::create_dir_all(&dir).expect("create test dir");

    let mut rig = SyntheticTendonRig::new(1.0 / UNITS_TO_METER);
    let mut session = CalibrationSession::new(UNITS_TO_METER);
    let mut rng = StdRng::from_seed([11u8; 32]);
    for &command in [-0.1, 0.0, 0.1, 0.2].iter() {
        session.record_command(command);
        rig.command_bend(command);
        collect_noisy_window(&mut session, &rig, &mut rng, 5);
    }
    session.save(&dir).expect("save");

    // Drop the last tip average only, the way an outside edit of the saved
    // session can. The histories no longer pair up and the fit must report
    // that instead of indexing out of bounds.
    let tip_averages_path = dir.join("tip_transforms_measured_avg.json");
    let mut tip_averages: Vec<MeasuredTransform> =
        serde_json::from_str(&fs::read_to_string(&tip_averages_path).expect("read"))
            .expect("parse");
    tip_averages.pop();
    fs::write(
        &tip_averages_path,
        serde_json::to_string(&tip_averages).expect("serialize"),
    )
    .expect("rewrite");

    let reloaded = CalibrationSession::load(&dir, UNITS_TO_METER).expect("load");
    match reloaded.fit() {
        Err(CalibrationError::SampleCountMismatch { poses: 3, commands: 4 }) => {}
        other => panic!("expected SampleCountMismatch, got fit: {}", other.is_ok()),
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_load_missing_directory_is_reported() {
    let missing = test_output_dir("never_written");
    fs::remove_dir_all(&missing).ok();

    let result = CalibrationSession::load(&missing, UNITS_TO_METER);
    assert!(matches!(result, Err(CalibrationError::PathNotFound(_))));
}

#[test]
fn test_coefficient_files_carry_one_curve_per_component() {
    let dir = test_output_dir("coeffs");
    fs::create_dir_all(&dir).expect("create test dir");

    let mut rig = SyntheticTendonRig::new(1.0 / UNITS_TO_METER);
    let mut session = CalibrationSession::new(UNITS_TO_METER);
    let mut rng = StdRng::from_seed([9u8; 32]);
    for &command in [-0.2, -0.1, 0.0, 0.1, 0.2].iter() {
        session.record_command(command);
        rig.command_bend(command);
        collect_noisy_window(&mut session, &rig, &mut rng, 5);
    }

    let fit = session.fit().expect("fit");
    let (tip_path, derivative_path) = fit
        .save_coefficients(&dir, "20260102030405")
        .expect("save coefficients");

    assert_eq!(
        tip_path.file_name().and_then(|n| n.to_str()),
        Some("20260102030405_xyzthz_polyfit_coeffs.json")
    );
    assert_eq!(
        derivative_path.file_name().and_then(|n| n.to_str()),
        Some("20260102030405_dxdydzdthz_polyfit_coeffs.json")
    );

    for path in [&tip_path, &derivative_path] {
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("parse");
        for key in ["x", "y", "z", "thz"] {
            // Cubic fits, four coefficients each
            assert_eq!(value[key].as_array().map(|a| a.len()), Some(4), "{}", key);
        }
    }

    fs::remove_dir_all(&dir).ok();
}
