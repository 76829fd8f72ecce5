//! Example: chaining deferred values and driving the event loop

use fos_deferred::{Config, Deferred, Function, Value, fos_event_loop};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    fos_deferred::configure(Config::default());
    println!("fOS Deferred v{}", fos_deferred::VERSION);

    // Settles once virtual time reaches 100ms
    let timer = Deferred::with_executor(|resolve, _reject| {
        fos_event_loop::set_timeout(
            move || {
                let _ = resolve.call1("timer");
            },
            100,
        );
        Ok(())
    });

    let sum = Deferred::all(vec![Value::from(1), Deferred::resolve(2).into(), Value::from(3)]).then(
        Function::unary(|values| {
            let total: f64 = values
                .as_array()
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_number)
                .sum();
            Ok(Value::from(total))
        }),
        (),
    );

    let recovered = Deferred::reject("network down")
        .catch(Function::unary(|reason| Ok(Value::from(format!("recovered from: {reason}")))))
        .finally(Function::new(|_, _| {
            println!("cleanup ran");
            Ok(Value::Undefined)
        }));

    let first = Deferred::race(vec![timer.clone().into(), Value::from("immediate")]);

    let stats = fos_event_loop::run_until_idle()?;
    println!(
        "ran {} microtasks, {} macrotasks, {} timers",
        stats.microtasks, stats.macrotasks, stats.timers_fired
    );

    for (name, deferred) in [("sum", &sum), ("recovered", &recovered), ("race", &first), ("timer", &timer)] {
        match deferred.settlement() {
            Some(settlement) => println!("{name}: {:?} {}", settlement.state(), settlement.value()),
            None => println!("{name}: pending"),
        }
    }
    Ok(())
}
