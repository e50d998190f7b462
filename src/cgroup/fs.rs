use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::time::Duration;

use crate::cgroup::path::CgroupPath;
use crate::cgroup::types::{DeviceIOStat, IOStat, PressureType, ResourcePressure};
use crate::util::error::{OomdError, Result};

pub const CONTROLLERS_FILE: &str = "cgroup.controllers";
pub const PROCS_FILE: &str = "cgroup.procs";
pub const CGROUP_STAT_FILE: &str = "cgroup.stat";
pub const MEM_CURRENT_FILE: &str = "memory.current";
pub const MEM_PRESSURE_FILE: &str = "memory.pressure";
pub const MEM_LOW_FILE: &str = "memory.low";
pub const MEM_HIGH_FILE: &str = "memory.high";
pub const MEM_HIGH_TMP_FILE: &str = "memory.high.tmp";
pub const MEM_MAX_FILE: &str = "memory.max";
pub const MEM_MIN_FILE: &str = "memory.min";
pub const MEM_STAT_FILE: &str = "memory.stat";
pub const MEM_SWAP_CURRENT_FILE: &str = "memory.swap.current";
pub const IO_PRESSURE_FILE: &str = "io.pressure";
pub const IO_STAT_FILE: &str = "io.stat";

#[derive(Debug, Default, Clone)]
pub struct DirEnts {
    pub files: Vec<String>,
    pub dirs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFilter {
    Files,
    Dirs,
    All,
}

enum PsiFormat {
    Missing,
    Invalid,
    Experimental,
    Upstream,
}

fn psi_format(lines: &[String]) -> PsiFormat {
    if lines.is_empty() {
        return PsiFormat::Missing;
    }
    if lines[0].starts_with("some") && lines.len() >= 2 {
        PsiFormat::Upstream
    } else if lines[0].starts_with("aggr") && lines.len() >= 3 {
        PsiFormat::Experimental
    } else {
        PsiFormat::Invalid
    }
}

pub fn has_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn bad_file(path: &str, what: &str) -> OomdError {
    OomdError::BadControlFile(format!("{}: {}", path, what))
}

/// One internal retry on EINTR/EAGAIN, then the error surfaces to the
/// caller as BadControlFile.
fn read_to_string_retry(path: &str) -> std::io::Result<String> {
    match fs::read_to_string(path) {
        Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
            fs::read_to_string(path)
        }
        other => other,
    }
}

fn write_all_retry(path: &str, contents: &str) -> std::io::Result<()> {
    match fs::write(path, contents) {
        Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
            fs::write(path, contents)
        }
        other => other,
    }
}

/// Reads a file and returns its lines. Returns an empty vector when the
/// file is missing or unreadable; parsers layered on top report that as
/// BadControlFile where it matters.
pub fn read_file_by_line(path: &str) -> Vec<String> {
    match read_to_string_retry(path) {
        Ok(content) => content.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

pub fn is_dir(path: &str) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Lists a directory's regular files and/or subdirectories, eliding
/// dotfiles. The kernel-supplied entry type is preferred; entries the
/// kernel does not type are classified with a stat call.
pub fn read_dir(path: &str, filter: EntryFilter) -> DirEnts {
    let mut de = DirEnts::default();
    let iter = match fs::read_dir(path) {
        Ok(iter) => iter,
        Err(_) => return de,
    };

    for entry in iter.flatten() {
        let name = match entry.file_name().into_string() {
            Ok(n) => n,
            Err(_) => continue,
        };
        if name.starts_with('.') {
            continue;
        }

        // file_type() rides on d_type where kernfs provides it; the
        // fallback stats the entry instead.
        let ft = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => match fs::symlink_metadata(entry.path()) {
                Ok(md) => md.file_type(),
                Err(_) => continue,
            },
        };

        if ft.is_file() && filter != EntryFilter::Dirs {
            de.files.push(name);
        } else if ft.is_dir() && filter != EntryFilter::Files {
            de.dirs.push(name);
        }
    }

    de
}

/// Expands glob metacharacters in a fully qualified cgroup path against
/// the filesystem, returning every existing match.
///
/// The walk is depth first so that wide trees don't pin every level in
/// memory at once, and each level is pattern matched to prune dead
/// branches early. Segments without metacharacters are appended without
/// enumerating their parent directory.
pub fn resolve_wildcard_path(cgpath: &CgroupPath) -> Vec<String> {
    let absolute = cgpath.absolute();
    let parts: Vec<&str> = absolute.split('/').filter(|s| !s.is_empty()).collect();
    let mut results = Vec::new();
    if parts.is_empty() {
        return results;
    }

    let mut stack: Vec<(String, usize)> = vec![("/".to_string(), 0)];

    while let Some((prefix, idx)) = stack.pop() {
        if idx < parts.len() - 1 && !has_glob(parts[idx]) {
            stack.push((format!("{}{}/", prefix, parts[idx]), idx + 1));
            continue;
        }

        if !is_dir(&prefix) {
            continue;
        }

        let pattern = match glob::Pattern::new(parts[idx]) {
            Ok(p) => p,
            Err(_) => continue,
        };

        let de = read_dir(&prefix, EntryFilter::All);
        for entry in de.files.iter().chain(de.dirs.iter()) {
            if !pattern.matches(entry) {
                continue;
            }
            if idx == parts.len() - 1 {
                results.push(format!("{}{}", prefix, entry));
            } else {
                stack.push((format!("{}{}/", prefix, entry), idx + 1));
            }
        }
    }

    results
}

/// Segment-aware prefix test.
pub fn is_under_parent_path(parent: &str, path: &str) -> bool {
    if parent.is_empty() || path.is_empty() {
        return false;
    }

    let parent_parts: Vec<&str> = parent.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if path_parts.len() < parent_parts.len() {
        return false;
    }

    parent_parts
        .iter()
        .zip(path_parts.iter())
        .all(|(a, b)| a == b)
}

pub fn read_controllers(path: &str) -> Vec<String> {
    let lines = read_file_by_line(&format!("{}/{}", path, CONTROLLERS_FILE));
    match lines.first() {
        Some(line) => line.split_whitespace().map(str::to_string).collect(),
        None => Vec::new(),
    }
}

pub fn get_pids(path: &str) -> Vec<libc::pid_t> {
    read_file_by_line(&format!("{}/{}", path, PROCS_FILE))
        .iter()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

pub fn read_respressure(path: &str, kind: PressureType) -> Result<ResourcePressure> {
    let lines = read_file_by_line(path);
    let line_index = match kind {
        PressureType::Some => 0,
        PressureType::Full => 1,
    };
    let type_name = match kind {
        PressureType::Some => "some",
        PressureType::Full => "full",
    };

    match psi_format(&lines) {
        PsiFormat::Upstream => {
            // some avg10=0.22 avg60=0.17 avg300=1.11 total=58761459
            let toks: Vec<&str> = lines[line_index].split_whitespace().collect();
            if toks.len() != 5 || toks[0] != type_name {
                return Err(bad_file(path, "invalid format"));
            }

            let mut avgs = [0f32; 3];
            for (i, (tok, name)) in toks[1..4]
                .iter()
                .zip(["avg10", "avg60", "avg300"])
                .enumerate()
            {
                let (key, val) = tok
                    .split_once('=')
                    .ok_or_else(|| bad_file(path, "invalid format"))?;
                if key != name {
                    return Err(bad_file(path, "invalid format"));
                }
                avgs[i] = val
                    .parse()
                    .map_err(|_| bad_file(path, "invalid format"))?;
            }

            let (key, val) = toks[4]
                .split_once('=')
                .ok_or_else(|| bad_file(path, "invalid format"))?;
            if key != "total" {
                return Err(bad_file(path, "invalid format"));
            }
            let total: u64 = val
                .parse()
                .map_err(|_| bad_file(path, "invalid format"))?;

            Ok(ResourcePressure {
                sec_10: avgs[0],
                sec_60: avgs[1],
                sec_600: avgs[2],
                total: Some(Duration::from_micros(total)),
            })
        }
        PsiFormat::Experimental => {
            // aggr 316016073
            // some 0.00 0.03 0.05
            // full 0.00 0.03 0.05
            let toks: Vec<&str> = lines[line_index + 1].split_whitespace().collect();
            if toks.len() != 4 || toks[0] != type_name {
                return Err(bad_file(path, "invalid format"));
            }

            let parse = |s: &str| -> Result<f32> {
                s.parse().map_err(|_| bad_file(path, "invalid format"))
            };

            Ok(ResourcePressure {
                sec_10: parse(toks[1])?,
                sec_60: parse(toks[2])?,
                sec_600: parse(toks[3])?,
                total: None,
            })
        }
        PsiFormat::Missing => Err(bad_file(path, "missing file")),
        PsiFormat::Invalid => Err(bad_file(path, "invalid format")),
    }
}

pub fn read_mempressure(path: &str, kind: PressureType) -> Result<ResourcePressure> {
    read_respressure(&format!("{}/{}", path, MEM_PRESSURE_FILE), kind)
}

pub fn read_iopressure(path: &str, kind: PressureType) -> Result<ResourcePressure> {
    read_respressure(&format!("{}/{}", path, IO_PRESSURE_FILE), kind)
}

/// System-wide memory pressure, with the legacy /proc/mempressure
/// fallback for kernels predating upstream PSI.
pub fn read_system_mempressure(kind: PressureType) -> Result<ResourcePressure> {
    read_respressure("/proc/pressure/memory", kind)
        .or_else(|_| read_respressure("/proc/mempressure", kind))
}

pub fn read_system_iopressure(kind: PressureType) -> Result<ResourcePressure> {
    read_respressure("/proc/pressure/io", kind)
}

fn read_single_int(path: &str) -> Result<i64> {
    let lines = read_file_by_line(path);
    if lines.len() != 1 {
        return Err(bad_file(path, "missing file"));
    }
    lines[0]
        .trim()
        .parse()
        .map_err(|_| bad_file(path, "invalid format"))
}

pub fn read_memcurrent(path: &str) -> Result<i64> {
    read_single_int(&format!("{}/{}", path, MEM_CURRENT_FILE))
}

fn read_min_max_low_high(path: &str, file: &str) -> Result<i64> {
    let file_name = format!("{}/{}", path, file);
    let lines = read_file_by_line(&file_name);
    if lines.len() != 1 {
        return Err(bad_file(&file_name, "missing file"));
    }
    if lines[0].trim() == "max" {
        return Ok(i64::MAX);
    }
    lines[0]
        .trim()
        .parse()
        .map_err(|_| bad_file(&file_name, "invalid format"))
}

pub fn read_memlow(path: &str) -> Result<i64> {
    read_min_max_low_high(path, MEM_LOW_FILE)
}

pub fn read_memhigh(path: &str) -> Result<i64> {
    read_min_max_low_high(path, MEM_HIGH_FILE)
}

pub fn read_memmax(path: &str) -> Result<i64> {
    read_min_max_low_high(path, MEM_MAX_FILE)
}

pub fn read_memmin(path: &str) -> Result<i64> {
    read_min_max_low_high(path, MEM_MIN_FILE)
}

/// memory.high.tmp holds "<bytes> <micros>", the second field being the
/// grace duration the kernel keeps the temporary limit alive.
pub fn read_memhigh_tmp(path: &str) -> Result<(i64, Duration)> {
    let file_name = format!("{}/{}", path, MEM_HIGH_TMP_FILE);
    let lines = read_file_by_line(&file_name);
    if lines.len() != 1 {
        return Err(bad_file(&file_name, "missing file"));
    }

    let toks: Vec<&str> = lines[0].split_whitespace().collect();
    if toks.len() != 2 {
        return Err(bad_file(&file_name, "invalid format"));
    }

    let bytes = if toks[0] == "max" {
        i64::MAX
    } else {
        toks[0]
            .parse()
            .map_err(|_| bad_file(&file_name, "invalid format"))?
    };
    let micros: u64 = toks[1]
        .parse()
        .map_err(|_| bad_file(&file_name, "invalid format"))?;

    Ok((bytes, Duration::from_micros(micros)))
}

/// The swap controller can be compiled out (CONFIG_MEMCG_SWAP=n); a
/// missing file reads as zero rather than an error.
pub fn read_swap_current(path: &str) -> Result<i64> {
    let file_name = format!("{}/{}", path, MEM_SWAP_CURRENT_FILE);
    let lines = read_file_by_line(&file_name);
    if lines.len() != 1 {
        return Ok(0);
    }
    lines[0]
        .trim()
        .parse()
        .map_err(|_| bad_file(&file_name, "invalid format"))
}

fn get_stat_like(path: &str) -> Result<HashMap<String, i64>> {
    let lines = read_file_by_line(path);
    let mut map = HashMap::new();
    for line in &lines {
        let mut toks = line.split_whitespace();
        if let (Some(key), Some(val)) = (toks.next(), toks.next()) {
            if let Ok(val) = val.parse::<i64>() {
                map.insert(key.to_string(), val);
            }
        }
    }
    Ok(map)
}

pub fn get_vmstat(path: &str) -> Result<HashMap<String, i64>> {
    get_stat_like(path)
}

/// /proc/meminfo reports KiB; values are converted to bytes here so
/// nothing downstream has to remember the unit.
pub fn get_meminfo(path: &str) -> Result<HashMap<String, i64>> {
    let lines = read_file_by_line(path);
    let mut map = HashMap::new();
    for line in &lines {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(val) = rest.split_whitespace().next() else {
            continue;
        };
        if let Ok(val) = val.parse::<i64>() {
            map.insert(key.trim().to_string(), val * 1024);
        }
    }
    Ok(map)
}

pub fn get_memstat(path: &str) -> Result<HashMap<String, i64>> {
    get_stat_like(&format!("{}/{}", path, MEM_STAT_FILE))
}

/// Missing entries read as zero, matching the kernel's treatment of
/// absent cgroup.stat keys.
pub fn get_nr_dying_descendants(path: &str) -> i64 {
    get_stat_like(&format!("{}/{}", path, CGROUP_STAT_FILE))
        .map(|m| m.get("nr_dying_descendants").copied().unwrap_or(0))
        .unwrap_or(0)
}

pub fn read_iostat(path: &str) -> Result<IOStat> {
    let file_name = format!("{}/{}", path, IO_STAT_FILE);
    let lines = read_file_by_line(&file_name);
    let mut io_stat = Vec::with_capacity(lines.len());

    for line in &lines {
        // 8:16 rbytes=1434584 wbytes=1512567 rios=164 wios=43 dbytes=0 dios=0
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.len() != 7 || !toks[0].contains(':') {
            return Err(bad_file(&file_name, "invalid format"));
        }

        let mut dev = DeviceIOStat {
            dev_id: toks[0].to_string(),
            ..Default::default()
        };

        for tok in &toks[1..] {
            let (key, val) = tok
                .split_once('=')
                .ok_or_else(|| bad_file(&file_name, "invalid format"))?;
            let val: i64 = val
                .parse()
                .map_err(|_| bad_file(&file_name, "invalid format"))?;
            match key {
                "rbytes" => dev.rbytes = val,
                "wbytes" => dev.wbytes = val,
                "rios" => dev.rios = val,
                "wios" => dev.wios = val,
                "dbytes" => dev.dbytes = val,
                "dios" => dev.dios = val,
                _ => return Err(bad_file(&file_name, "invalid format")),
            }
        }

        io_stat.push(dev);
    }

    Ok(io_stat)
}

pub fn write_memhigh(path: &str, value: i64) -> Result<()> {
    let file_name = format!("{}/{}", path, MEM_HIGH_FILE);
    write_all_retry(&file_name, &value.to_string())
        .map_err(|e| bad_file(&file_name, &format!("write failed: {}", e)))
}

pub fn write_memhigh_tmp(path: &str, value: i64, duration: Duration) -> Result<()> {
    let file_name = format!("{}/{}", path, MEM_HIGH_TMP_FILE);
    let content = format!("{} {}", value, duration.as_micros());
    write_all_retry(&file_name, &content)
        .map_err(|e| bad_file(&file_name, &format!("write failed: {}", e)))
}

/// Returns the xattr value, or an empty string when the attribute is
/// absent or unreadable.
pub fn get_xattr(path: &str, attr: &str) -> String {
    match xattr::get(path, attr) {
        Ok(Some(val)) => String::from_utf8_lossy(&val).into_owned(),
        _ => String::new(),
    }
}

pub fn set_xattr(path: &str, attr: &str, val: &str) -> bool {
    xattr::set(path, attr, val.as_bytes()).is_ok()
}

/// Scans a mountinfo-format file for the first cgroup2 entry and returns
/// its mount point. Plain /proc/mounts lines are accepted too.
pub fn get_cgroup2_mount_point(path: &str) -> Option<String> {
    for line in read_file_by_line(path) {
        if let Some((before, after)) = line.split_once(" - ") {
            // mountinfo: the FS type is the first field past the separator,
            // the mount point is the fifth field before it
            let fstype = after.split_whitespace().next();
            let mount_point = before.split_whitespace().nth(4);
            if fstype == Some("cgroup2") {
                if let Some(mp) = mount_point {
                    return Some(mp.to_string());
                }
            }
        } else {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() > 2 && parts[2] == "cgroup2" {
                return Some(parts[1].to_string());
            }
        }
    }
    None
}
