use charger_config::load_ocv_table_csv;
use std::io::Write;

fn write_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    f.write_all(contents.as_bytes()).expect("write csv");
    f.flush().expect("flush csv");
    f
}

#[test]
fn loads_descending_table() {
    let f = write_csv("ocv_uv,capacity\n4185000,100\n3900000,60\n3650000,5\n3400000,0\n");
    let rows = load_ocv_table_csv(f.path()).expect("load");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].ocv_uv, 4_185_000);
    assert_eq!(rows[3].capacity, 0);
}

#[test]
fn rejects_wrong_headers() {
    let f = write_csv("uv,cap\n4185000,100\n3650000,5\n");
    let err = load_ocv_table_csv(f.path()).expect_err("headers");
    assert!(format!("{err:#}").contains("headers"));
}

#[test]
fn rejects_non_monotonic_voltage() {
    let f = write_csv("ocv_uv,capacity\n3650000,5\n4185000,100\n");
    let err = load_ocv_table_csv(f.path()).expect_err("monotonic");
    assert!(format!("{err:#}").contains("decreasing"));
}

#[test]
fn rejects_capacity_out_of_range() {
    let f = write_csv("ocv_uv,capacity\n4185000,120\n3650000,5\n");
    assert!(load_ocv_table_csv(f.path()).is_err());
}

#[test]
fn rejects_single_row() {
    let f = write_csv("ocv_uv,capacity\n4185000,100\n");
    let err = load_ocv_table_csv(f.path()).expect_err("too short");
    assert!(format!("{err:#}").contains("two rows"));
}
