//! Command-line front end for the task list.
//!
//! Each argument group is one command, applied in order:
//!
//! ```text
//! todomvc add "Buy milk" add "Walk dog" toggle 1 show active list
//! ```
//!
//! Task numbers refer to the list as last shown (1-based). Set
//! `TODOMVC_STORAGE_DIR` to keep tasks between runs. With no arguments a short
//! scripted demo runs instead.

use anyhow::{Context as _, Result, bail};
use std::sync::Arc;
use todomvc::{App, AppConfig, Task, TaskId, TodoEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "todomvc=info,refract_runtime=info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    let app = App::start(&config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        demo(&app).await?;
    } else {
        run_commands(&app, &args)?;
        print!("{}", app.render()?);
    }

    app.shutdown().await?;
    Ok(())
}

async fn demo(app: &App) -> Result<()> {
    println!("=== TodoMVC ===\n");
    print!("{}", app.render()?);

    println!("\nAdding tasks from two producers...");
    let sender = app.sender();
    let producer = tokio::spawn(async move {
        for title in ["Buy milk", "Write documentation"] {
            sender
                .dispatch(TodoEvent::CreateTodo {
                    title: title.to_string(),
                })
                .await?;
        }
        Ok::<_, refract_core::DispatchError>(())
    });
    app.dispatch(TodoEvent::CreateTodo {
        title: "Deploy to production".to_string(),
    })
    .await?;
    producer.await??;
    app.settle().await?;
    print!("{}", app.render()?);

    println!("\nCompleting the first task, then showing active tasks...");
    let first = visible_id(app, 1)?;
    app.dispatch_sync(TodoEvent::ToggleDone { id: first })?;
    app.navigate("#/active")?;
    print!("{}", app.render()?);

    println!("\nTrying to show a filter that does not exist...");
    app.navigate("#/bogus")?;
    print!("{}", app.render()?);

    println!("\nClearing completed tasks...");
    app.dispatch_sync(TodoEvent::ClearCompleted)?;
    print!("{}", app.render()?);

    println!("\n=== Demo Complete ===");
    Ok(())
}

fn run_commands(app: &App, args: &[String]) -> Result<()> {
    let mut args = args.iter().map(String::as_str);
    while let Some(command) = args.next() {
        let event = match command {
            "add" => TodoEvent::CreateTodo {
                title: title(args.next())?,
            },
            "toggle" => TodoEvent::ToggleDone {
                id: visible_id(app, number(args.next())?)?,
            },
            "edit" => TodoEvent::UpdateTodo {
                id: visible_id(app, number(args.next())?)?,
                title: title(args.next())?,
            },
            "rm" => TodoEvent::DeleteTodo {
                id: visible_id(app, number(args.next())?)?,
            },
            "toggle-all" => TodoEvent::CompleteAllToggle,
            "clear" => TodoEvent::ClearCompleted,
            "show" => todomvc::Route::parse(args.next().unwrap_or("all")).into_event(),
            "list" => {
                print!("{}", app.render()?);
                continue;
            },
            other => bail!("unknown command {other:?}"),
        };
        app.dispatch_sync(event)
            .with_context(|| format!("command {command:?} was rejected"))?;
    }
    Ok(())
}

fn title(arg: Option<&str>) -> Result<String> {
    let title = arg.map(str::trim).unwrap_or_default();
    if title.is_empty() {
        bail!("a task needs a title");
    }
    Ok(title.to_string())
}

fn number(arg: Option<&str>) -> Result<usize> {
    let arg = arg.context("expected a task number")?;
    arg.parse()
        .with_context(|| format!("{arg:?} is not a task number"))
}

fn visible_id(app: &App, number: usize) -> Result<TaskId> {
    let visible: Arc<Vec<Task>> = app.subs().visible_todos.value()?;
    number
        .checked_sub(1)
        .and_then(|index| visible.get(index))
        .map(|task| task.id)
        .with_context(|| format!("no task number {number}"))
}
