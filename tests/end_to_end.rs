use simscript::devices::mock::{MockPhysicalPort, MockVirtualPort};
use simscript::devices::{AxisUsage, DeviceRegistry, VIRTUAL_DEVICE_NAME};
use simscript::persistence::MemoryState;
use simscript::scheduler::{AppContext, HeadlessUi, Scheduler, TickOutcome};
use simscript::scripting::{Script, ScriptHost};
use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const REMAP: &str = r#"
let throttle = devices.get("Saitek X52").getAxis(0);
let vjoy = devices.get(1);
vjoy.setAxis(0, modulo(throttle * 16384.0 + 16384.0, 1, 32769));
"#;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

struct Rig {
    physical: MockPhysicalPort,
    virtual_out: MockVirtualPort,
    scheduler: Scheduler,
    _dir: TempDir,
}

fn rig(source: &str) -> Rig {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("remap.rhai"), source).unwrap();

    let physical = MockPhysicalPort::new();
    physical.add_device("Saitek X52", 6, 32);
    physical.add_device(VIRTUAL_DEVICE_NAME, 1, 8);
    let virtual_out = MockVirtualPort::new();
    virtual_out.add_device(1, &[(AxisUsage::X, 1, 32768)], 8);

    let registry = DeviceRegistry::enumerate(
        Some(Box::new(physical.clone())),
        Some(Box::new(virtual_out.clone())),
    );
    let host = ScriptHost::new(Rc::new(RefCell::new(registry)));
    let mut ctx = AppContext::new(
        host,
        Box::new(HeadlessUi),
        Box::new(MemoryState::default()),
        dir.path().to_path_buf(),
    );
    ctx.script = Some(Script::new(dir.path(), "remap").unwrap());

    Rig {
        physical,
        virtual_out,
        scheduler: Scheduler::new(ctx, 30).unwrap(),
        _dir: dir,
    }
}

/// Runs one tick with a subscriber that records everything at INFO and up
fn tick_captured(scheduler: &mut Scheduler) -> (TickOutcome, String) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let outcome = tracing::subscriber::with_default(subscriber, || scheduler.tick());
    (outcome, captured.text())
}

#[test]
fn one_tick_polls_runs_and_stays_quiet() {
    let mut rig = rig(REMAP);
    rig.physical.set_axis(0, 0, 32767);

    let (outcome, output) = tick_captured(&mut rig.scheduler);

    assert!(matches!(outcome, TickOutcome::OnTime { .. }));
    assert_eq!(rig.physical.update_count(), 1);
    assert_eq!(rig.virtual_out.update_count(1), 1);
    let report = rig.virtual_out.last_report(1).unwrap();
    assert_eq!(report.axis(AxisUsage::X), 32768);
    assert_eq!(output, "");
}

#[test]
fn values_wrap_into_the_axis_range() {
    let mut rig = rig(REMAP);
    rig.physical.set_axis(0, 0, -32767);
    tick_captured(&mut rig.scheduler);
    // -1.0 maps to 0, which wraps to the top of [1, 32769)
    let report = rig.virtual_out.last_report(1).unwrap();
    assert_eq!(report.axis(AxisUsage::X), 32768);

    rig.physical.set_axis(0, 0, 0);
    tick_captured(&mut rig.scheduler);
    let report = rig.virtual_out.last_report(1).unwrap();
    assert_eq!(report.axis(AxisUsage::X), 16384);
    assert_eq!(rig.virtual_out.update_count(1), 2);
}

#[test]
fn a_failing_script_warns_once_and_keeps_ticking() {
    let mut rig = rig(r#"devices.get("Rudder Pedals").getAxis(0);"#);

    let (_, first) = tick_captured(&mut rig.scheduler);
    assert!(first.contains("devices.get('Rudder Pedals') is not available"));
    assert!(first.contains("WARN"));

    for _ in 0..20 {
        let (_, output) = tick_captured(&mut rig.scheduler);
        assert_eq!(output, "");
    }
    assert_eq!(rig.physical.update_count(), 21);
    assert_eq!(rig.scheduler.context().ticks(), 21);
}

#[test]
fn virtual_devices_are_released_on_shutdown() {
    let mut rig = rig(REMAP);
    tick_captured(&mut rig.scheduler);
    assert_eq!(rig.virtual_out.acquire_count(1), 1);

    let virtual_out = rig.virtual_out.clone();
    drop(rig);
    assert!(virtual_out.was_relinquished(1));
}
