use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use sdds::{
    error_kind, ColumnDefinition, Dataset, DefKind, Encoding, ErrorKind, ParameterDefinition,
    PrimitiveType, ReadOptions, SddsConfig, Statistic, Value,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("sddstest-readopts-{prefix}-{pid}-{t}-{id}"))
}

/// Two pages of ten rows: x = 0..10 (Float64), tag = "r<i>", gain parameter.
fn write_ten(path: &Path, encoding: Encoding) -> Result<()> {
    let mut ds = Dataset::create_with(path, encoding, SddsConfig::default())?;
    let layout = ds.layout_mut()?;
    layout.define_parameter(ParameterDefinition::new("gain", PrimitiveType::Float64).with_units("V"))?;
    layout.define_column(ColumnDefinition::new("x", PrimitiveType::Float64).with_units("m"))?;
    layout.define_column(ColumnDefinition::new("tag", PrimitiveType::String))?;
    ds.write_layout()?;
    for _ in 0..2 {
        ds.start_page(10)?;
        ds.set_parameter("gain", 2.0)?;
        for i in 0..10 {
            ds.set_row_values(i, &[Value::Float64(i as f64), Value::from(format!("r{i}"))])?;
        }
        ds.write_page()?;
    }
    ds.terminate()
}

fn xs(ds: &Dataset) -> Vec<f64> {
    ds.column("x")
        .and_then(|c| c.as_slice::<f64>())
        .unwrap_or_default()
        .to_vec()
}

fn tags(ds: &Dataset) -> Vec<String> {
    ds.column("tag")
        .and_then(|c| c.as_slice::<String>())
        .unwrap_or_default()
        .to_vec()
}

#[test]
fn sparse_interval_and_offset() -> Result<()> {
    let root = unique_root("sparse");
    fs::create_dir_all(&root)?;
    for encoding in [Encoding::Ascii, Encoding::Binary] {
        let path = root.join(format!("s.{}", encoding.name()));
        write_ten(&path, encoding)?;
        let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
        ds.read_page_with(&ReadOptions::sparse(3, 1))?;
        // ceil((10 - 1) / 3) rows at 1, 4, 7
        assert_eq!(xs(&ds), vec![1.0, 4.0, 7.0]);
        assert_eq!(tags(&ds), vec!["r1", "r4", "r7"]);

        ds.read_page_with(&ReadOptions::sparse(4, 0))?;
        assert_eq!(xs(&ds), vec![0.0, 4.0, 8.0]);
    }
    Ok(())
}

#[test]
fn statistics_replace_intervals() -> Result<()> {
    let root = unique_root("stats");
    fs::create_dir_all(&root)?;
    let path = root.join("st.sdds");
    write_ten(&path, Encoding::Binary)?;
    let cases = [
        (Statistic::Average, vec![0.5, 2.5, 4.5, 6.5, 8.5]),
        (Statistic::Minimum, vec![0.0, 2.0, 4.0, 6.0, 8.0]),
        (Statistic::Maximum, vec![1.0, 3.0, 5.0, 7.0, 9.0]),
    ];
    for (stat, want) in cases {
        let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
        ds.read_page_with(&ReadOptions::sparse(2, 0).with_statistic(stat))?;
        assert_eq!(xs(&ds), want, "{stat:?}");
    }

    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    ds.read_page_with(&ReadOptions::sparse(3, 0).with_statistic(Statistic::Median))?;
    assert_eq!(xs(&ds), vec![1.0, 4.0, 7.0, 9.0]);
    Ok(())
}

#[test]
fn last_rows_window() -> Result<()> {
    let root = unique_root("last");
    fs::create_dir_all(&root)?;
    for encoding in [Encoding::Ascii, Encoding::Binary] {
        let path = root.join(format!("l.{}", encoding.name()));
        write_ten(&path, encoding)?;
        let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
        ds.read_page_with(&ReadOptions::default().with_last_rows(3))?;
        assert_eq!(xs(&ds), vec![7.0, 8.0, 9.0]);
        assert_eq!(ds.read_page()?, Some(2));
        assert_eq!(ds.row_count(), 10);
    }
    Ok(())
}

#[test]
fn zero_sparse_interval_is_rejected() -> Result<()> {
    let root = unique_root("zero");
    fs::create_dir_all(&root)?;
    let path = root.join("z.sdds");
    write_ten(&path, Encoding::Binary)?;
    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    let err = ds.read_page_with(&ReadOptions::sparse(0, 0)).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Usage);
    Ok(())
}

#[test]
fn deferred_units_conversion_applies_to_every_page() -> Result<()> {
    let root = unique_root("units-deferred");
    fs::create_dir_all(&root)?;
    let path = root.join("u.sdds");
    write_ten(&path, Encoding::Binary)?;

    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    ds.set_units_conversion(DefKind::Column, "x", "mm", 10.0)?;
    // replaces the first factor
    ds.set_units_conversion(DefKind::Column, "x", "mm", 1000.0)?;
    assert_eq!(ds.layout().column("x").and_then(|c| c.def.units.as_deref()), Some("mm"));
    for _ in 0..2 {
        ds.read_page()?;
        assert_eq!(xs(&ds)[..3], [0.0, 1000.0, 2000.0]);
    }
    Ok(())
}

#[test]
fn eager_units_conversion_touches_current_page_only() -> Result<()> {
    let root = unique_root("units-eager");
    fs::create_dir_all(&root)?;
    let path = root.join("u.sdds");
    write_ten(&path, Encoding::Ascii)?;

    let mut ds = Dataset::open_read_with(&path, SddsConfig::default())?;
    ds.read_page()?;
    ds.set_units_conversion(DefKind::Parameter, "gain", "mV", 1000.0)?;
    assert_eq!(ds.parameter("gain"), Some(&Value::Float64(2000.0)));
    assert_eq!(ds.layout().parameter("gain").and_then(|p| p.def.units.as_deref()), Some("mV"));

    ds.read_page()?;
    assert_eq!(ds.parameter("gain"), Some(&Value::Float64(2.0)));

    let err = ds
        .set_units_conversion(DefKind::Column, "tag", "none", 2.0)
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Usage);
    let err = ds
        .set_units_conversion(DefKind::Column, "missing", "m", 2.0)
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Schema);
    Ok(())
}

#[test]
fn header_include_and_depth_guard() -> Result<()> {
    let root = unique_root("include");
    fs::create_dir_all(&root)?;
    fs::write(
        root.join("cols.inc"),
        "&column name=x, type=double, units=m, &end\n&column name=tag, type=string, &end\n",
    )?;
    fs::write(
        root.join("main.sdds"),
        "SDDS1\n\
         ! hand-written header\n\
         &parameter name=gain, type=double, &end\n\
         &include filename=cols.inc, &end\n\
         &data mode=ascii, &end\n\
         ! page number 1\n\
         1.5\n\
         2\n\
         0.5 first\n\
         1.5 \"second row\"\n",
    )?;
    let mut ds = Dataset::open_read_with(root.join("main.sdds"), SddsConfig::default())?;
    assert_eq!(ds.layout().columns().len(), 2);
    assert_eq!(ds.read_page()?, Some(1));
    assert_eq!(ds.parameter("gain"), Some(&Value::Float64(1.5)));
    assert_eq!(xs(&ds), vec![0.5, 1.5]);
    assert_eq!(tags(&ds), vec!["first", "second row"]);

    // a file that includes itself
    fs::write(
        root.join("loop.sdds"),
        "SDDS1\n&include filename=loop.sdds, &end\n&data mode=ascii, &end\n",
    )?;
    let err = Dataset::open_read_with(root.join("loop.sdds"), SddsConfig::default().with_max_include_depth(4))
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Schema);
    Ok(())
}
