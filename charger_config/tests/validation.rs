use charger_config::{Config, load_toml};
use rstest::rstest;

const GOOD_TOML: &str = r#"
[battery]
present_mode = "fuel-gauge"
fullbatt_uv = 4350000
fullbatt_ua = 120000
fullbatt_soc = 1000
fullbatt_vchkdrop_uv = 50000
cap_one_time = 30
trickle_time_out = 1500

[thermal]
measure = true
temp_min = 0
temp_max = 500
temp_diff = 50

[polling]
mode = "always"
interval_ms = 15000

[duration]
charging_max_ms = 21600000
discharging_max_ms = 7200000

[charge]
voltage_max = 6500000
voltage_drop = 700000
fast_voltage_max = 10500000
fast_voltage_drop = 700000
wdt_interval_s = 15

[jeita]
dcp = [
    [-100, -50, 0, 4100000],
    [50, 100, 500000, 4350000],
    [450, 420, 1500000, 4350000],
    [550, 520, 0, 4100000],
]

[tracker]
enabled = true
ocv_table = [
    { ocv_uv = 4185000, capacity = 100 },
    { ocv_uv = 3900000, capacity = 60 },
    { ocv_uv = 3650000, capacity = 5 },
    { ocv_uv = 3400000, capacity = 0 },
]
"#;

#[test]
fn good_config_parses_and_validates() {
    let cfg = load_toml(GOOD_TOML).expect("parse");
    cfg.validate().expect("validate");
    assert_eq!(cfg.jeita.dcp.len(), 4);
    assert_eq!(cfg.jeita.dcp[2].current_ua, 1_500_000);
    assert_eq!(cfg.tracker.ocv_table[1].capacity, 60);
}

#[test]
fn defaults_validate() {
    Config::default().validate().expect("default config valid");
}

#[test]
fn jeita_rows_accept_inline_tables() {
    let toml = r#"
[jeita]
sdp = [
    { temp = -100, recovery_temp = -50, current_ua = 0, term_volt_uv = 4100000 },
    { temp = 50, recovery_temp = 100, current_ua = 500000, term_volt_uv = 4350000 },
    { temp = 450, recovery_temp = 420, current_ua = 700000, term_volt_uv = 4350000 },
    { temp = 550, recovery_temp = 520, current_ua = 0, term_volt_uv = 4100000 },
]
"#;
    let cfg = load_toml(toml).expect("parse");
    cfg.validate().expect("validate");
    assert_eq!(cfg.jeita.sdp[1].recovery_temp, 100);
}

#[rstest]
#[case::jeita_wrong_len(
    "[jeita]\ndcp = [[0, 0, 0, 4100000]]\n",
    "exactly 4 rows"
)]
#[case::jeita_not_increasing(
    "[jeita]\ndcp = [[100, 50, 0, 4100000], [50, 100, 1, 4100000], [450, 420, 1, 4100000], [550, 520, 0, 4100000]]\n",
    "strictly increasing"
)]
#[case::polling_zero("[polling]\nmode = \"always\"\ninterval_ms = 0\n", "interval_ms")]
#[case::voltage_pair("[charge]\nvoltage_max = 6500000\n", "must be set together")]
#[case::duration_pair("[duration]\ncharging_max_ms = 1000\n", "must be set together")]
#[case::soc_range("[battery]\nfullbatt_soc = 2000\n", "permille")]
#[case::no_recovery_window(
    "[thermal]\nmeasure = true\ntemp_min = 0\ntemp_max = 100\ntemp_diff = 50\n",
    "recovery window"
)]
fn bad_configs_are_rejected(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse");
    let err = cfg.validate().expect_err("should fail validation");
    let msg = format!("{err:#}");
    assert!(msg.contains(needle), "error {msg:?} missing {needle:?}");
}

#[test]
fn tracker_requires_ocv_table_and_full_thresholds() {
    let toml = r#"
[tracker]
enabled = true
"#;
    let cfg = load_toml(toml).expect("parse");
    assert!(cfg.validate().is_err());
}
