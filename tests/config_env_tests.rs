use swarm::config::{max_parallel_override, SwarmSpec, MAX_PARALLEL_ENV};

mod helpers;
use helpers::{unique_test_temp_dir, write_spec, EnvVarGuard};

const YAML: &str = r#"
version: "0.1"
coordinator:
  kind: master_worker
  master: planner
  max_parallel: 2
agents:
  - name: planner
    responses: ["1. a\n2. b\n3. c", "done"]
  - name: w0
  - name: w1
"#;

fn run_and_count_calls(spec: &SwarmSpec) -> usize {
    let built = spec.build().unwrap();
    let coordinator = built.swarm.coordinator().unwrap();
    assert_eq!(coordinator.name(), "master_worker");
    let result = built.swarm.run("job").unwrap();
    assert_eq!(result.final_answer(), Some("done"));
    built.agents.iter().map(|a| a.call_count()).sum()
}

#[test]
fn override_is_none_when_unset() {
    let _env = EnvVarGuard::unset(MAX_PARALLEL_ENV);
    assert_eq!(max_parallel_override().unwrap(), None);
}

#[test]
fn override_parses_positive_integers() {
    let _env = EnvVarGuard::set(MAX_PARALLEL_ENV, " 8 ");
    assert_eq!(max_parallel_override().unwrap(), Some(8));
}

#[test]
fn override_rejects_zero_and_garbage() {
    for raw in ["0", "-1", "many", ""] {
        let _env = EnvVarGuard::set(MAX_PARALLEL_ENV, raw);
        let err = max_parallel_override().unwrap_err();
        assert!(err.to_string().contains("invalid SWARM_MAX_PARALLEL"), "{err}");
    }
}

#[test]
fn build_applies_env_override() {
    let spec = SwarmSpec::from_yaml_str(YAML).unwrap();
    let _env = EnvVarGuard::set(MAX_PARALLEL_ENV, "3");

    assert_eq!(spec.build().unwrap().max_parallel, 3);
    assert_eq!(run_and_count_calls(&spec), 5);
}

#[test]
fn build_uses_document_value_without_env() {
    let spec = SwarmSpec::from_yaml_str(YAML).unwrap();
    let _env = EnvVarGuard::unset(MAX_PARALLEL_ENV);
    assert_eq!(spec.build().unwrap().max_parallel, 2);
}

#[test]
fn default_coordinator_ignores_env_override() {
    let spec = SwarmSpec::from_yaml_str("version: \"0.1\"\nagents:\n  - name: solo\n").unwrap();
    let _env = EnvVarGuard::set(MAX_PARALLEL_ENV, "8");
    assert_eq!(spec.build().unwrap().max_parallel, 1);
}

#[test]
fn build_fails_on_invalid_env_override() {
    let spec = SwarmSpec::from_yaml_str(YAML).unwrap();
    let _env = EnvVarGuard::set(MAX_PARALLEL_ENV, "nope");
    let err = spec.build().unwrap_err();
    assert!(format!("{err:#}").contains("invalid SWARM_MAX_PARALLEL"), "{err:#}");
}

#[test]
fn load_from_file_round_trips_document() {
    let _env = EnvVarGuard::unset(MAX_PARALLEL_ENV);
    let path = write_spec(&unique_test_temp_dir("config-load"), YAML);
    let spec = SwarmSpec::load_from_file(&path).unwrap();

    assert_eq!(spec.coordinator.max_parallel, Some(2));
    assert_eq!(
        spec.agents.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        vec!["planner", "w0", "w1"]
    );
    assert_eq!(run_and_count_calls(&spec), 5);
}

#[test]
fn load_from_missing_file_names_the_path() {
    let path = unique_test_temp_dir("config-missing").join("absent.yaml");
    let err = SwarmSpec::load_from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.yaml"), "{err:#}");
}
