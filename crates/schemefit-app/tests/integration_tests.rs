// End-to-end runs over a small fixture league: defaults/ seeded into a
// scratch project, fixture CSVs under data/, outputs under output/.

use schemefit_app::commands;
use schemefit_app::config::{load_config, AppConfig};
use schemefit_core::model::position::Position;
use schemefit_core::model::scheme::Scheme;
use schemefit_core::scoring::ranking::RankedFit;
use std::fs;
use std::path::{Path, PathBuf};

const FIXTURES: &[(&str, &str)] = &[
    ("team_seasonal.csv", "team_seasonal.csv"),
    ("team_weekly.csv", "team_weekly.csv"),
    ("qb_free_agents.csv", "qb_free_agents.csv"),
    ("qb_population.csv", "qb_population.csv"),
    ("rb_free_agents.csv", "rb_free_agents.csv"),
    ("rb_population.csv", "rb_population.csv"),
];

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Build a fresh project directory with the shipped defaults and the
/// fixture data. `edit` may rewrite a defaults file before config/ is
/// seeded.
fn project_with(name: &str, edit: impl FnOnce(&Path)) -> PathBuf {
    let root = std::env::temp_dir().join(format!("schemefit_it_{name}"));
    let _ = fs::remove_dir_all(&root);

    let defaults = root.join("defaults");
    fs::create_dir_all(&defaults).unwrap();
    let shipped = manifest_dir().join("../../defaults");
    for entry in fs::read_dir(&shipped).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), defaults.join(entry.file_name())).unwrap();
    }
    edit(&defaults);

    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    let fixtures = manifest_dir().join("tests/fixtures");
    for (from, to) in FIXTURES {
        fs::copy(fixtures.join(from), data.join(to)).unwrap();
    }
    root
}

fn project(name: &str) -> PathBuf {
    project_with(name, |_| {})
}

fn config_for(root: &Path) -> AppConfig {
    load_config(root).unwrap()
}

fn fit_named<'a>(fits: &'a [RankedFit], team: &str, player: &str) -> &'a RankedFit {
    fits.iter()
        .find(|f| f.fit.team == team && f.fit.player_name == player)
        .unwrap_or_else(|| panic!("no fit for {player} at {team}"))
}

#[test]
fn pass_heavy_shotgun_team_is_air_raid() {
    let root = project("air_raid");
    let config = config_for(&root);

    let report = commands::schemes(&config).unwrap();
    assert!(report.context.failures().is_empty());
    assert_eq!(report.context.teams().len(), 4, "league average row is dropped");

    let kc = report.context.team("KC").unwrap();
    assert_eq!(kc.scheme.computed, Scheme::AirRaid);
    assert_eq!(kc.scheme.predicted, Scheme::AirRaid);
    assert!(!kc.scheme.overridden);
    assert_eq!(kc.weights.entries()[0].scheme, Scheme::AirRaid);

    let bal = report.context.team("baltimore").unwrap();
    assert_eq!(bal.scheme.predicted, Scheme::SpreadOption);

    let text = fs::read_to_string(&report.path).unwrap();
    assert_eq!(text.lines().count(), 5);
    assert!(text.contains("Kansas City Chiefs"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn short_season_back_takes_exact_low_sample_penalty() {
    let root = project("low_sample");
    let config = config_for(&root);

    let report = commands::fits(&config, Position::RunningBack, Some("KC")).unwrap();
    assert!(report.failures.is_empty());
    assert!(report.fits.iter().all(|f| f.fit.team == "KC"));

    let short = fit_named(&report.fits, "KC", "Short Season");
    let full = fit_named(&report.fits, "KC", "Full Season");
    assert!((short.fit.adjustment("low_sample").unwrap() + 0.10).abs() < 1e-12);
    assert_eq!(full.fit.adjustment("low_sample"), Some(0.0));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn quarterback_without_carries_gets_no_rushing_bonus() {
    let root = project("qb_rushing");
    let config = config_for(&root);

    let report = commands::fits(&config, Position::Quarterback, Some("BAL")).unwrap();
    let pocket = fit_named(&report.fits, "BAL", "Pocket Passer");
    assert_eq!(pocket.fit.adjustment("rushing"), Some(0.0));
    assert!(pocket.fit.final_fit.is_finite());

    // 6 carries a game at 5.5 a carry runs into the cap
    let scrambler = fit_named(&report.fits, "BAL", "Scrambler");
    assert!((scrambler.fit.adjustment("rushing").unwrap() - 0.15).abs() < 1e-9);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn quarterback_need_exception_replaces_tiers() {
    let root = project("qb_exception");
    let config = config_for(&root);

    let report = commands::fits(&config, Position::Quarterback, None).unwrap();
    for fit in report.fits.iter().filter(|f| f.fit.team == "KC") {
        assert_eq!(fit.fit.adjustment("team_need"), Some(-0.4));
    }
    assert!(report.fits.iter().any(|f| f.fit.team == "PIT"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn bonus_cap_position_changes_the_result() {
    let root = project("cap_default");
    let config = config_for(&root);
    let capped = commands::fits(&config, Position::RunningBack, Some("KC")).unwrap();
    let workhorse = fit_named(&capped.fits, "KC", "Workhorse Back");
    // 0.02 + 0.03 + 0.05 + 0.0375 + 0.0375 clamped to 0.12
    assert!((workhorse.fit.adjustment("bonus_cap").unwrap() + 0.055).abs() < 1e-9);

    let moved = project_with("cap_moved", |defaults| {
        let path = defaults.join("adjustments.toml");
        let text = fs::read_to_string(&path).unwrap();
        let cap = "[[rb]]\nname = \"bonus_cap\"\nkind = \"cap_total\"\nmax = 0.12\n\n";
        let first_bonus = "[[rb]]\nname = \"rushing_volume\"";
        assert!(text.contains(cap));
        let text = text.replacen(cap, "", 1).replacen(first_bonus, &format!("{cap}{first_bonus}"), 1);
        fs::write(&path, text).unwrap();
    });
    let config = config_for(&moved);
    let uncapped = commands::fits(&config, Position::RunningBack, Some("KC")).unwrap();
    let early = fit_named(&uncapped.fits, "KC", "Workhorse Back");
    assert_eq!(early.fit.adjustment("bonus_cap"), Some(0.0));
    assert!((early.fit.final_fit - workhorse.fit.final_fit - 0.055).abs() < 1e-9);

    let _ = fs::remove_dir_all(&root);
    let _ = fs::remove_dir_all(&moved);
}

#[test]
fn older_season_is_discounted() {
    let root = project("recency");
    let config = config_for(&root);

    let report = commands::fits(&config, Position::RunningBack, Some("PIT")).unwrap();
    let old = fit_named(&report.fits, "PIT", "Old Season Back");
    assert_eq!(old.fit.season, 2023);
    assert!((old.fit.adjustment("recency").unwrap() + 0.05).abs() < 1e-12);
    let current = fit_named(&report.fits, "PIT", "Workhorse Back");
    assert_eq!(current.fit.adjustment("recency"), Some(0.0));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn repeated_runs_are_identical() {
    let root = project("idempotent");
    let config = config_for(&root);

    let first = commands::fits(&config, Position::RunningBack, None).unwrap();
    let second = commands::fits(&config, Position::RunningBack, None).unwrap();
    assert_eq!(first.fits.len(), 6 * 4);
    assert_eq!(first.fits, second.fits);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn fits_are_written_as_csv_and_json_with_ranks() {
    let root = project("fit_outputs");
    let config = config_for(&root);

    let report = commands::fits(&config, Position::RunningBack, Some("SF")).unwrap();
    assert!(report.csv_path.exists());
    assert!(report.json_path.exists());

    let csv = fs::read_to_string(&report.csv_path).unwrap();
    let header = csv.lines().next().unwrap();
    assert!(header.starts_with("team,team_name,player_id,player_name"));
    assert!(header.contains("adj_low_sample"));
    assert!(header.contains("rushing_epa_rank"));
    assert_eq!(csv.lines().count(), 1 + report.fits.len());

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report.json_path).unwrap()).unwrap();
    assert_eq!(json["position"], "rb");
    assert_eq!(json["season"], 2024);
    assert_eq!(json["fits"].as_array().unwrap().len(), report.fits.len());

    // sorted by final fit, best first
    assert!(report
        .fits
        .windows(2)
        .all(|w| w[0].fit.final_fit >= w[1].fit.final_fit));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn unknown_team_yields_no_fits() {
    let root = project("unknown_team");
    let config = config_for(&root);

    let report = commands::fits(&config, Position::RunningBack, Some("Nowhere")).unwrap();
    assert!(report.fits.is_empty());
    assert!(report.failures.is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn population_ties_share_the_lower_rank() {
    let root = project("rankings");
    let config = config_for(&root);

    let (ranking, path) = commands::rankings(&config, Position::RunningBack).unwrap();
    // the misfiled receiver row is filtered out by position
    assert_eq!(ranking.len(), 8);
    assert!(ranking.ranks_for("Misfiled Receiver").is_none());

    let rank = |player: &str| ranking.ranks_for(player).unwrap()["rushing_epa"].unwrap();
    assert_eq!(rank("Workhorse Back"), 1);
    assert_eq!(rank("Short Season"), 5);
    assert_eq!(rank("Full Season"), 5);
    assert_eq!(rank("League Backup"), 7);
    assert_eq!(rank("Veteran Grinder"), 8);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.lines().next().unwrap().contains("ngs_avg_time_to_los_inv_rank"));
    assert_eq!(text.lines().count(), 9);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn rankings_need_a_population_table() {
    let root = project("no_population");
    let config = config_for(&root);

    let err = commands::rankings(&config, Position::OffensiveLine).unwrap_err();
    assert!(err.to_string().contains("population"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn rankings_ignore_unreadable_team_files() {
    let root = project("rankings_bad_teams");
    fs::write(root.join("data/team_seasonal.csv"), "not,a,team,table\n1,2,3,4\n").unwrap();
    fs::remove_file(root.join("data/team_weekly.csv")).unwrap();
    let config = config_for(&root);

    assert!(commands::schemes(&config).is_err());
    let (ranking, _) = commands::rankings(&config, Position::RunningBack).unwrap();
    assert_eq!(ranking.len(), 8);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn unusable_population_leaves_fits_unranked() {
    let root = project("bad_population");
    fs::write(
        root.join("data/rb_population.csv"),
        "player_id,player_name,position,season,games\nrb-99,Stats Missing,RB,2024,10\n",
    )
    .unwrap();
    let config = config_for(&root);

    assert!(commands::rankings(&config, Position::RunningBack).is_err());
    let report = commands::fits(&config, Position::RunningBack, Some("KC")).unwrap();
    assert_eq!(report.fits.len(), 6);
    assert!(report.fits.iter().all(|f| f.ranks.is_empty()));
    assert!(report.csv_path.exists());

    let _ = fs::remove_dir_all(&root);
}
