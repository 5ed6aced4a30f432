#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use chrono::{DateTime, Local, TimeZone};
use graft::domain::models::RunReport;
use graft::error::{GraftError, Result};
use graft::services::config::GraftConfig;
use graft::services::external::{CommandRunner, ExternalCommand, PrivilegeProbe};
use graft::services::orchestrator::{Collaborators, Orchestrator};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const KERNEL: &str = "app/Http/Kernel.php";
pub const ROUTES: &str = "routes/admin.php";
pub const CONTROLLER: &str = "app/Http/Controllers/Admin/Settings/IndexController.php";
pub const TEMPLATE: &str = "resources/views/admin/settings/index.blade.php";
pub const HOOK_CLASS: &str = "app/Http/Middleware/ServerOwnership.php";
pub const MIGRATIONS: &str = "database/migrations";

pub const KERNEL_ALIASES: &str = r#"<?php

namespace Pterodactyl\Http;

use Illuminate\Foundation\Http\Kernel as HttpKernel;

class Kernel extends HttpKernel
{
    protected $middleware = [
        \Illuminate\Http\Middleware\HandleCors::class,
    ];

    protected $middlewareAliases = [
        'auth' => \Pterodactyl\Http\Middleware\Authenticate::class,
        'guest' => \Pterodactyl\Http\Middleware\RedirectIfAuthenticated::class,
    ];
}
"#;

pub const KERNEL_LEGACY: &str = r#"<?php

namespace Pterodactyl\Http;

use Illuminate\Foundation\Http\Kernel as HttpKernel;

class Kernel extends HttpKernel
{
    protected $routeMiddleware = [
        'auth' => \Pterodactyl\Http\Middleware\Authenticate::class,
    ];
}
"#;

pub const ROUTES_FILE: &str = r#"<?php

use Illuminate\Support\Facades\Route;
use Pterodactyl\Http\Controllers\Admin;

Route::get('/', [Admin\BaseController::class, 'index'])->name('admin.index');

Route::group(['prefix' => 'settings'], function () {
    Route::get('/', [Admin\Settings\IndexController::class, 'index'])->name('admin.settings');
    Route::patch('/', [Admin\Settings\IndexController::class, 'update']);
});

Route::group(['prefix' => 'nodes'], function () {
    Route::get('/', [Admin\Nodes\NodeController::class, 'index'])->name('admin.nodes');
});
"#;

pub const CONTROLLER_FILE: &str = r#"<?php

namespace Pterodactyl\Http\Controllers\Admin\Settings;

use Illuminate\View\View;
use Pterodactyl\Http\Controllers\Controller;

class IndexController extends Controller
{
    public function index(): View
    {
        return $this->view->make('admin.settings.index');
    }
}
"#;

pub const TEMPLATE_FILE: &str = r#"@extends('layouts.admin')

@section('content')
<div class="row">
    <form action="{{ route('admin.settings') }}" method="POST">
        <div class="box">
            <input type="text" name="app:name" class="form-control">
        </div>
        {!! csrf_field() !!}
        <button type="submit" name="_method" value="PATCH" class="btn btn-sm btn-primary pull-right">Save</button>
    </form>
</div>
@endsection
"#;

/// A throwaway panel application plus backup and state dirs.
pub struct TestApp {
    _tmp: TempDir,
    pub root: PathBuf,
    pub backups: PathBuf,
    pub state: PathBuf,
}

impl TestApp {
    /// Newer layout: settings controller and route table present.
    pub fn dedicated() -> Self {
        let app = Self::empty();
        app.write(KERNEL, KERNEL_ALIASES);
        app.write(ROUTES, ROUTES_FILE);
        app.write(CONTROLLER, CONTROLLER_FILE);
        app.write(TEMPLATE, TEMPLATE_FILE);
        app
    }

    /// Older layout: no settings controller, legacy middleware list.
    pub fn settings_view() -> Self {
        let app = Self::empty();
        app.write(KERNEL, KERNEL_LEGACY);
        app.write(ROUTES, ROUTES_FILE);
        app.write(TEMPLATE, TEMPLATE_FILE);
        app
    }

    fn empty() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().join("panel");
        fs::create_dir_all(root.join("app/Http/Middleware")).expect("create middleware dir");
        fs::create_dir_all(root.join(MIGRATIONS)).expect("create migrations dir");
        Self {
            backups: tmp.path().join("backups"),
            state: tmp.path().join("state"),
            root,
            _tmp: tmp,
        }
    }

    pub fn config(&self) -> GraftConfig {
        let mut cfg = GraftConfig::default();
        cfg.paths.app_root = self.root.clone();
        cfg.backup.dir = self.backups.clone();
        cfg.state.dir = self.state.clone();
        cfg
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let p = self.path(rel);
        fs::create_dir_all(p.parent().expect("fixture parent")).expect("create fixture dir");
        fs::write(p, content).expect("write fixture file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).expect("read fixture file")
    }

    pub fn migrations(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path(MIGRATIONS))
            .expect("read migrations dir")
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    /// Every file under the application root with its content.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        let mut out = BTreeMap::new();
        collect(&self.root, &mut out);
        out
    }

    pub fn install(&self, config: &GraftConfig, runner: &FakeRunner, at: DateTime<Local>) -> RunReport {
        let probe = FakeProbe(true);
        let collab = Collaborators {
            runner,
            privilege: &probe,
        };
        Orchestrator::new(config, collab, at).run()
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("graft");
        cmd.env_remove("GRAFT_CONFIG").env("GRAFT_LOG", "off");
        cmd
    }
}

fn collect(dir: &Path, out: &mut BTreeMap<PathBuf, String>) {
    for entry in fs::read_dir(dir).expect("read dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            collect(&path, out);
        } else {
            out.insert(path.clone(), fs::read_to_string(&path).expect("read file"));
        }
    }
}

pub fn at(day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2026, 10, day, hour, min, sec)
        .single()
        .expect("unambiguous local time")
}

/// Records every command; fails those whose argv contains a given text.
#[derive(Default)]
pub struct FakeRunner {
    pub calls: RefCell<Vec<String>>,
    failing: Vec<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(pattern: &str) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            failing: vec![pattern.to_string()],
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, cmd: &ExternalCommand) -> Result<()> {
        let shown = cmd.display();
        self.calls.borrow_mut().push(shown.clone());
        if self.failing.iter().any(|f| shown.contains(f.as_str())) {
            return Err(GraftError::ExternalCommandFailure {
                command: shown,
                code: Some(1),
            });
        }
        if let Some(out) = &cmd.stdout_to {
            fs::write(out, "-- dump\n").map_err(|e| GraftError::io("fake dump", e))?;
        }
        Ok(())
    }
}

pub struct FakeProbe(pub bool);

impl PrivilegeProbe for FakeProbe {
    fn is_privileged(&self) -> bool {
        self.0
    }
}
