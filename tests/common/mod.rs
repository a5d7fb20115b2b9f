//! Shared helpers for the integration test suites

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// A 4-stage GEN -> G4 -> DETSIM -> RECO workflow with 20 Monte Carlo jobs,
/// using a defaults block the way production specs do.
pub const FOUR_STAGE_SPEC_YAML: &str = r#"
description: "gen->reco 2 hit"
monte_carlo: 20
defaults:
  repo: experiment/mc-scripts
  ref: main
  lifetime_days: 1
stages:
  - stage_id: 1
    jobscript: multistep/gen.jobscript
    wall_seconds: 14400
    rss_mib: 4000
    events_per_job: 50
    fhicl_file: mpvmpr_gen_1x2x6.fcl
    output_pattern_next_stage: "*_gen.root"
  - stage_id: 2
    jobscript: multistep/g4.jobscript
    wall_seconds: 28800
    rss_mib: 6000
    fhicl_file: standard_g4_dune10kt_1x2x6.fcl
    output_pattern_next_stage: "*_g4.root"
  - stage_id: 3
    jobscript: multistep/detsim.jobscript
    wall_seconds: 28800
    rss_mib: 6000
    fhicl_file: standard_detsim_dune10kt_1x2x6.fcl
    output_pattern_next_stage: "*_detsim.root"
  - stage_id: 4
    jobscript: multistep/reco.jobscript
    wall_seconds: 28800
    rss_mib: 6000
    fhicl_file: standard_reco_dune10kt_1x2x6.fcl
    output_patterns: ["*_reco.root", "*_larcv.root"]
    output_rse_expression: DUNE_US_FNAL_DISK_STAGE
    lifetime_days: 90
"#;

/// Write a spec file into `dir` and return its path.
pub fn write_spec(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("failed to write spec file");
    path
}

/// Write an executable stand-in for the justin CLI into `dir`.
///
/// The script appends every invocation to `calls.log` in the same directory,
/// prints a workflow id for create-workflow, and exits non-zero on the
/// invocation number stored in `fail_on_call` (if any).
#[cfg(unix)]
pub fn write_fake_justin(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script_path = dir.join("justin");
    let script = format!(
        "#!/bin/sh\n\
         dir={dir}\n\
         printf '%s\\n' \"$*\" >> \"$dir/calls.log\"\n\
         count=$(wc -l < \"$dir/calls.log\")\n\
         if [ -f \"$dir/fail_on_call\" ] && [ \"$count\" -eq \"$(cat \"$dir/fail_on_call\")\" ]; then\n\
         \techo 'simulated justin failure' >&2\n\
         \texit 1\n\
         fi\n\
         case \"$1\" in\n\
         \tcreate-workflow) echo '4242 Workflow created' ;;\n\
         \tshow-*) printf 'Jobsub ID  Stage  State\\n' ;;\n\
         esac\n\
         exit 0\n",
        dir = dir.display()
    );
    fs::write(&script_path, script).expect("failed to write fake justin");

    let mut perms = fs::metadata(&script_path)
        .expect("failed to stat fake justin")
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script_path, perms).expect("failed to chmod fake justin");

    script_path
}

/// Make the fake justin fail on the given invocation number (1-based).
pub fn set_fail_on_call(dir: &Path, call: usize) {
    fs::write(dir.join("fail_on_call"), call.to_string()).expect("failed to write fail_on_call");
}

/// Invocations recorded by the fake justin, one per line, in order.
pub fn read_calls(dir: &Path) -> Vec<String> {
    match fs::read_to_string(dir.join("calls.log")) {
        Ok(content) => content.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}
