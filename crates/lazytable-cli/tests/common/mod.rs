use std::path::{Path, PathBuf};

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Tab-separated iris-like sample: two features, a class label and an id.
pub const FLOWERS_TAB: &str = "\
petal\tsepal\tspecies\tid
c\tc\td\ts
\t\tclass\tm
1.4\t5.1\tsetosa\tf-01
4.7\t7.0\tversicolor\tf-02
1.3\t4.9\tsetosa\tf-03
5.1\t6.3\tvirginica\tf-04
4.5\t6.4\tversicolor\tf-05
";

pub fn write_tab(dir: &Path) -> TestResult<PathBuf> {
    let path = dir.join("flowers.tab");
    std::fs::write(&path, FLOWERS_TAB)?;
    Ok(path)
}

pub fn write_fixed(dir: &Path) -> TestResult<PathBuf> {
    let tab = write_tab(dir)?;
    let fixed = dir.join("flowers.fixed");
    lazytable_sources::convert_tab_to_fixed(&tab, &fixed)?;
    Ok(fixed)
}
