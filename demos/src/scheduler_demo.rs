use qao::{Event, EventMask, Handle, InstantiationGuard, NonOwningHandle, QaoObject, Runtime, RuntimeRef};
use tracing::info;

struct Ticker {
    name: String,
    ticks: u32,
}

impl Ticker {
    fn new(_guard: InstantiationGuard, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ticks: 0,
        }
    }
}

impl QaoObject for Ticker {
    fn type_name(&self) -> &'static str {
        "Ticker"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn on_event(&mut self, event: Event, _runtime: &RuntimeRef, _self_handle: NonOwningHandle) {
        if event == Event::Update1 {
            self.ticks += 1;
            info!(name = %self.name, ticks = self.ticks, "ticked");
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

pub fn run(steps: u32) {
    let runtime = Runtime::new();
    let handles: Vec<Handle> = ["alpha", "beta", "gamma"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            runtime
                .create(true, i as i32, |guard| Ticker::new(guard, *name))
                .expect("object construction never fails for Ticker")
        })
        .collect();

    for step in 0..steps {
        info!(step, "stepping scheduler");
        runtime.step(EventMask::UPDATE_1);
    }

    drop(handles);
    info!(attached = runtime.attached_count(), "scheduler demo finished");
}
