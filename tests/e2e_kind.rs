use std::error::Error;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Returns true if the given binary is accessible in PATH.
fn tool_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

const OPERATOR_NAMESPACE: &str = "guestbook-system";
const TEST_NAMESPACE: &str = "guestbook-e2e";
const OPERATOR_NAME: &str = "guestbook-operator";
const REDIS_NAME: &str = "cache";
const REST_API_NAME: &str = "web";

// ---------------------------------------------------------------------------
// E2E reconciliation test
//
// Tests RestApi and Redis reconciliation on a real Kind cluster.
// Run with: cargo test --test e2e_kind -- --ignored
// ---------------------------------------------------------------------------

/// End-to-end test that exercises both controllers:
///
/// 1. Start (or reuse) a Kind cluster.
/// 2. Install the CRDs rendered by `crdgen`.
/// 3. Apply a Redis and a RestApi referencing it.
/// 4. Wait for the leader, follower and frontend Deployments and Services.
/// 5. Scale the followers and wait for the Deployment to follow.
/// 6. Delete both resources and verify all children are garbage collected.
#[test]
#[ignore]
fn e2e_guestbook_reconciliation() -> Result<(), Box<dyn Error>> {
    // Skip gracefully when the required cluster tools are not installed.
    for tool in &["kind", "kubectl", "docker"] {
        if !tool_available(tool) {
            eprintln!("Skipping e2e test: `{tool}` not found in PATH.");
            return Ok(());
        }
    }

    let cluster_name =
        std::env::var("KIND_CLUSTER_NAME").unwrap_or_else(|_| "guestbook-e2e".into());
    ensure_kind_cluster(&cluster_name)?;

    // ── Install the CRDs ─────────────────────────────────────────────────────
    let crds = run_cmd(env!("CARGO_BIN_EXE_crdgen"), &[])?;
    kubectl_apply(&crds)?;
    run_cmd(
        "kubectl",
        &[
            "wait",
            "--for=condition=Established",
            "crd/restapis.webapp.guestbook.dev",
            "crd/redis.webapp.guestbook.dev",
            "--timeout=60s",
        ],
    )?;

    // ── Deploy the operator ──────────────────────────────────────────────────
    let image =
        std::env::var("E2E_OPERATOR_IMAGE").unwrap_or_else(|_| "guestbook-operator:e2e".into());
    if env_true("E2E_BUILD_IMAGE", true) {
        run_cmd("docker", &["build", "-t", &image, "."])?;
    }
    if env_true("E2E_LOAD_IMAGE", true) {
        run_cmd(
            "kind",
            &["load", "docker-image", &image, "--name", &cluster_name],
        )?;
    }

    let operator_yaml = operator_manifest(&image);
    let _cleanup = Cleanup {
        operator_manifest: operator_yaml.clone(),
    };

    for namespace in [OPERATOR_NAMESPACE, TEST_NAMESPACE] {
        run_cmd(
            "kubectl",
            &[
                "create",
                "namespace",
                namespace,
                "--dry-run=client",
                "-o",
                "yaml",
            ],
        )
        .and_then(|output| kubectl_apply(&output))?;
    }

    kubectl_apply(&operator_yaml)?;
    run_cmd(
        "kubectl",
        &[
            "rollout",
            "status",
            &format!("deployment/{}", OPERATOR_NAME),
            "-n",
            OPERATOR_NAMESPACE,
            "--timeout=180s",
        ],
    )?;

    // ── Apply the guestbook ──────────────────────────────────────────────────
    kubectl_apply(&redis_manifest(1))?;
    kubectl_apply(&rest_api_manifest())?;

    let children = [
        format!("{}-leader", REDIS_NAME),
        format!("{}-follower", REDIS_NAME),
        REST_API_NAME.to_string(),
    ];
    for child in &children {
        wait_for(
            &format!("deployment {}", child),
            Duration::from_secs(120),
            || resource_exists("deployment", child),
        )?;
        wait_for(
            &format!("service {}", child),
            Duration::from_secs(120),
            || resource_exists("service", child),
        )?;
    }

    wait_for("redis leaderService", Duration::from_secs(120), || {
        let leader = jsonpath("redis", REDIS_NAME, "{.status.leaderService}")?;
        Ok(leader == format!("{}-leader", REDIS_NAME))
    })?;

    wait_for("frontend wired to leader", Duration::from_secs(120), || {
        let env = jsonpath(
            "deployment",
            REST_API_NAME,
            "{.spec.template.spec.containers[0].env[?(@.name=='REDIS_MASTER_SERVICE_HOST')].value}",
        )?;
        Ok(env == format!("{}-leader", REDIS_NAME))
    })?;

    // ── Scale the followers ──────────────────────────────────────────────────
    kubectl_apply(&redis_manifest(3))?;
    wait_for("follower replicas", Duration::from_secs(120), || {
        let replicas = jsonpath(
            "deployment",
            &format!("{}-follower", REDIS_NAME),
            "{.spec.replicas}",
        )?;
        Ok(replicas == "3")
    })?;

    // ── Delete and verify garbage collection ─────────────────────────────────
    for (kind, name) in [("restapi", REST_API_NAME), ("redis", REDIS_NAME)] {
        run_cmd(
            "kubectl",
            &["delete", kind, name, "-n", TEST_NAMESPACE, "--wait=true"],
        )?;
    }
    for child in &children {
        wait_for(
            &format!("deployment {} deleted", child),
            Duration::from_secs(120),
            || Ok(!resource_exists("deployment", child)?),
        )?;
    }

    Ok(())
}

fn redis_manifest(followers: i32) -> String {
    format!(
        r#"apiVersion: webapp.guestbook.dev/v1
kind: Redis
metadata:
  name: {name}
  namespace: {namespace}
spec:
  followerReplicas: {followers}
"#,
        name = REDIS_NAME,
        namespace = TEST_NAMESPACE,
        followers = followers,
    )
}

fn rest_api_manifest() -> String {
    format!(
        r#"apiVersion: webapp.guestbook.dev/v1
kind: RestApi
metadata:
  name: {name}
  namespace: {namespace}
spec:
  redisName: {redis}
  frontend:
    replicas: 1
    resources:
      requests:
        cpu: 50m
"#,
        name = REST_API_NAME,
        namespace = TEST_NAMESPACE,
        redis = REDIS_NAME,
    )
}

fn operator_manifest(image: &str) -> String {
    format!(
        r#"---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: {operator_name}
  namespace: {operator_namespace}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: {operator_name}
rules:
  - apiGroups: ["webapp.guestbook.dev"]
    resources: ["restapis", "redis"]
    verbs: ["get", "list", "watch", "patch"]
  - apiGroups: ["webapp.guestbook.dev"]
    resources: ["restapis/status", "redis/status"]
    verbs: ["get", "patch", "update"]
  - apiGroups: ["apps"]
    resources: ["deployments"]
    verbs: ["get", "list", "watch", "create", "patch", "update"]
  - apiGroups: [""]
    resources: ["services"]
    verbs: ["get", "list", "watch", "create", "patch", "update"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: {operator_name}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: {operator_name}
subjects:
  - kind: ServiceAccount
    name: {operator_name}
    namespace: {operator_namespace}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {operator_name}
  namespace: {operator_namespace}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {operator_name}
  template:
    metadata:
      labels:
        app: {operator_name}
    spec:
      serviceAccountName: {operator_name}
      containers:
        - name: operator
          image: {image}
          imagePullPolicy: IfNotPresent
          args: ["run"]
          env:
            - name: RUST_LOG
              value: info,guestbook_operator=debug
"#,
        operator_name = OPERATOR_NAME,
        operator_namespace = OPERATOR_NAMESPACE,
        image = image,
    )
}

struct Cleanup {
    operator_manifest: String,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = run_cmd_quiet(
            "kubectl",
            &[
                "delete",
                "namespace",
                TEST_NAMESPACE,
                "--ignore-not-found=true",
            ],
        );
        let _ =
            run_cmd_with_stdin_quiet("kubectl", &["delete", "-f", "-"], &self.operator_manifest);
        let _ = run_cmd_quiet(
            "kubectl",
            &[
                "delete",
                "namespace",
                OPERATOR_NAMESPACE,
                "--ignore-not-found=true",
            ],
        );
    }
}

fn resource_exists(kind: &str, name: &str) -> Result<bool, Box<dyn Error>> {
    let output = run_cmd(
        "kubectl",
        &[
            "get",
            kind,
            name,
            "-n",
            TEST_NAMESPACE,
            "--ignore-not-found=true",
            "-o",
            "name",
        ],
    )?;
    Ok(!output.is_empty())
}

fn jsonpath(kind: &str, name: &str, path: &str) -> Result<String, Box<dyn Error>> {
    run_cmd(
        "kubectl",
        &[
            "get",
            kind,
            name,
            "-n",
            TEST_NAMESPACE,
            "-o",
            &format!("jsonpath={}", path),
        ],
    )
}

fn ensure_kind_cluster(name: &str) -> Result<(), Box<dyn Error>> {
    let clusters = run_cmd("kind", &["get", "clusters"])?;
    if clusters.lines().any(|line| line.trim() == name) {
        return Ok(());
    }
    run_cmd("kind", &["create", "cluster", "--name", name])?;
    Ok(())
}

fn kubectl_apply(manifest: &str) -> Result<(), Box<dyn Error>> {
    run_cmd_with_stdin("kubectl", &["apply", "-f", "-"], manifest)
}

fn run_cmd(program: &str, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let output = cmd.output()?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
            program, args, stdout, stderr
        )
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_cmd_with_stdin(program: &str, args: &[&str], input: &str) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        stdin.write_all(input.as_bytes())?;
        stdin.flush()?;
        drop(stdin);
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
            program, args, stdout, stderr
        )
        .into());
    }
    Ok(())
}

fn run_cmd_quiet(program: &str, args: &[&str]) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let _ = cmd.output();
    Ok(())
}

fn run_cmd_with_stdin_quiet(
    program: &str,
    args: &[&str],
    input: &str,
) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        let _ = stdin.write_all(input.as_bytes());
        let _ = stdin.flush();
        drop(stdin);
    }
    let _ = child.wait_with_output();
    Ok(())
}

fn wait_for<F>(label: &str, timeout: Duration, mut condition: F) -> Result<(), Box<dyn Error>>
where
    F: FnMut() -> Result<bool, Box<dyn Error>>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        if condition()? {
            return Ok(());
        }
        attempts += 1;
        if start.elapsed() > timeout {
            return Err(format!(
                "timeout while waiting for {} after {:?} (attempts={})",
                label, timeout, attempts
            )
            .into());
        }
        sleep(Duration::from_secs(3));
    }
}

fn env_true(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
