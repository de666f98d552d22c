//! Loader control sidecar for bulk-load tooling.
//!
//! Emitted next to a delimited export when the column kinds are known. Names
//! the data, bad, and discard files after the export's base name; temporal
//! columns carry their format masks, columns without a type mapping become
//! FILLER, excluded columns are omitted.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::value::SqlKind;

/// Render a control-file character: printable characters are quoted,
/// anything below space becomes a hex literal.
fn printable(c: char) -> String {
    if c >= ' ' {
        format!("'{}'", c)
    } else {
        format!("X'{:02x}'", c as u32)
    }
}

/// Write `<base>.ctl` into `dir`. `kinds` aligns with `titles`; `None`
/// marks a column with no type mapping.
#[allow(clippy::too_many_arguments)]
pub fn write_control_file(
    dir: &Path,
    base_name: &str,
    titles: &[String],
    kinds: &[Option<SqlKind>],
    enclosure: char,
    separator: char,
    row_sep: Option<&str>,
    excludes: &HashSet<String>,
) -> io::Result<PathBuf> {
    let mut b = String::with_capacity(4096);
    b.push_str(
        "OPTIONS (SKIP=1, ROWS=3000, BINDSIZE=16777216, STREAMSIZE=33554432, \
         ERRORS=1000, READSIZE=16777216, DIRECT=FALSE)\nLOAD DATA\n",
    );
    b.push_str(&format!("INFILE      {}.csv", base_name));
    if let Some(sep) = row_sep {
        b.push_str(&format!(" \"STR '{}'\"", sep));
    }
    b.push('\n');
    b.push_str(&format!("BADFILE     {}.bad\n", base_name));
    b.push_str(&format!("DISCARDFILE {}.dsc\n", base_name));
    b.push_str(&format!("APPEND INTO TABLE {}\n", base_name));
    b.push_str(&format!(
        "FIELDS CSV TERMINATED BY {} OPTIONALLY ENCLOSED BY {} AND {} TRAILING NULLCOLS\n(\n",
        printable(separator),
        printable(enclosure),
        printable(enclosure)
    ));

    let mut written = 0;
    for (i, title) in titles.iter().enumerate() {
        if excludes.contains(&title.to_uppercase()) {
            continue;
        }
        if written > 0 {
            b.push_str(",\n");
        }
        written += 1;
        let quoted = format!("\"{}\"", title);
        b.push_str(&format!("    {:<32}", quoted));
        match kinds.get(i).copied().flatten() {
            None => b.push_str("FILLER"),
            Some(kind) => {
                match kind {
                    SqlKind::Date => b.push_str("DATE \"YYYY-MM-DD HH24:MI:SS\" "),
                    SqlKind::Timestamp => b.push_str("TIMESTAMP \"YYYY-MM-DD HH24:MI:SSXFF\" "),
                    SqlKind::TimestampTz => {
                        b.push_str("TIMESTAMP WITH TIME ZONE \"YYYY-MM-DD HH24:MI:SSXFF TZH\" ")
                    }
                    _ => {}
                }
                b.push_str(&format!("NULLIF {}=BLANKS", quoted));
            }
        }
    }
    b.push_str("\n)");

    let path = dir.join(format!("{}.ctl", base_name));
    fs::write(&path, b)?;
    Ok(path)
}
