//! The menu protection add-on: the text graft injects and where it goes.
//!
//! Markers here are constants that stay the same whatever the surrounding
//! text becomes, so a newer block is still recognised as already installed.

use crate::domain::models::TargetVariant;
use crate::error::Result;
use crate::patch::anchor::Anchor;
use crate::patch::registry::RegistryEntry;
use crate::patch::template::TemplateFragment;
use crate::patch::Patch;
use crate::services::migration::{DefaultValue, FieldSpec, FieldType};

pub const SECTION_TITLE: &str = "Proteksi Menu";
pub const HOOK_KEY: &str = "'server.ownership'";
pub const ROUTE_NAME: &str = "admin.settings.protection";
pub const CONTROLLER_MARKER: &str = "function updateProtection(";
pub const HOOK_CLASS_MARKER: &str = "class ServerOwnership";
pub const MIGRATION_SLUG: &str = "add_menu_protection_fields";

pub const HOOK_CLASS_PATCH_ID: &str = "hook-class";
pub const CONTROLLER_PATCH_ID: &str = "controller-method";
pub const MIGRATION_PATCH_ID: &str = "migration";

pub fn migration_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec {
            name: "protection_enabled".to_string(),
            ty: FieldType::Boolean,
            nullable: false,
            default: Some(DefaultValue::Bool(false)),
        },
        FieldSpec {
            name: "protected_menus".to_string(),
            ty: FieldType::Text,
            nullable: true,
            default: None,
        },
    ]
}

/// Alias list opening line; renamed between framework versions.
pub fn hook_anchor(variant: TargetVariant) -> Anchor {
    match variant {
        TargetVariant::DedicatedEndpoint => Anchor::after_first("protected $middlewareAliases = ["),
        TargetVariant::SettingsView => Anchor::after_first("protected $routeMiddleware = ["),
    }
}

pub fn hook_entry() -> RegistryEntry {
    RegistryEntry::new(
        HOOK_KEY,
        "        'server.ownership' => \\Pterodactyl\\Http\\Middleware\\ServerOwnership::class,",
    )
}

/// Closing line of the settings route group, wherever it sits in the file,
/// so the relative path resolves under the settings prefix.
pub fn route_anchor() -> Anchor {
    Anchor::before_first("});").within("'prefix' => 'settings'")
}

pub fn route_entry() -> RegistryEntry {
    RegistryEntry::new(
        ROUTE_NAME,
        "    Route::post('/protection', [Admin\\Settings\\IndexController::class, 'updateProtection'])->name('admin.settings.protection');",
    )
}

pub fn controller_patch() -> Result<Patch> {
    Patch::new(
        CONTROLLER_PATCH_ID,
        CONTROLLER_MARKER,
        Anchor::before_last("}"),
        r#"
    /**
     * Proteksi Menu: store which admin menus are restricted.
     */
    public function updateProtection(\Illuminate\Http\Request $request): \Illuminate\Http\RedirectResponse
    {
        $request->user()->forceFill([
            'protection_enabled' => $request->boolean('protection_enabled'),
            'protected_menus' => $request->input('protected_menus'),
        ])->save();

        return redirect()->route('admin.settings');
    }"#,
    )
}

pub fn hook_class_source() -> &'static str {
    r#"<?php

namespace Pterodactyl\Http\Middleware;

use Closure;
use Illuminate\Http\Request;

class ServerOwnership
{
    /**
     * Proteksi Menu: only the owner or a root admin may open a protected server page.
     */
    public function handle(Request $request, Closure $next)
    {
        $user = $request->user();
        $server = $request->route()->parameter('server');

        if ($user && $server && !$user->root_admin && $server->owner_id !== $user->id) {
            abort(403, 'Proteksi Menu: akses ditolak.');
        }

        return $next($request);
    }
}
"#
}

pub fn template_anchor() -> Anchor {
    Anchor::before_last("</form>")
}

/// The settings section, rendered for the detected layout. In the settings
/// view layout the fields post with the existing form; otherwise a button
/// submits them to the dedicated route.
pub fn template_fragment(variant: TargetVariant) -> TemplateFragment {
    let submit = match variant {
        TargetVariant::SettingsView => String::new(),
        TargetVariant::DedicatedEndpoint => format!(
            "\n        <button type=\"submit\" class=\"btn btn-sm btn-primary\" formaction=\"{{{{ route('{ROUTE_NAME}') }}}}\">Simpan Proteksi</button>"
        ),
    };
    let body = format!(
        r#"<div class="box">
    <div class="box-header with-border">
        <h3 class="box-title">{SECTION_TITLE}</h3>
    </div>
    <div class="box-body">
        <div class="form-group">
            <label class="control-label">Aktifkan proteksi</label>
            <select name="protection_enabled" class="form-control">
                <option value="0" @if(!Auth::user()->protection_enabled) selected @endif>Nonaktif</option>
                <option value="1" @if(Auth::user()->protection_enabled) selected @endif>Aktif</option>
            </select>
        </div>
        <div class="form-group">
            <label class="control-label">Menu yang dilindungi</label>
            <input type="text" name="protected_menus" class="form-control" value="{{{{ Auth::user()->protected_menus }}}}">
            <p class="text-muted small">Pisahkan dengan koma, contoh: nodes,locations,nests</p>
        </div>{submit}
    </div>
</div>"#
    );
    TemplateFragment {
        title: SECTION_TITLE.to_string(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_block_carries_its_marker() {
        assert!(controller_patch().is_ok());
        assert!(hook_entry().text.contains(HOOK_KEY));
        assert!(route_entry().text.contains(ROUTE_NAME));
        assert!(hook_class_source().contains(HOOK_CLASS_MARKER));
        for variant in [TargetVariant::SettingsView, TargetVariant::DedicatedEndpoint] {
            let fragment = template_fragment(variant);
            assert!(fragment.body.contains(SECTION_TITLE));
        }
    }

    #[test]
    fn dedicated_layout_posts_to_its_own_route() {
        let dedicated = template_fragment(TargetVariant::DedicatedEndpoint).body;
        let legacy = template_fragment(TargetVariant::SettingsView).body;

        assert!(dedicated.contains("formaction=\"{{ route('admin.settings.protection') }}\""));
        assert!(!legacy.contains("formaction"));
        assert!(legacy.contains("value=\"{{ Auth::user()->protected_menus }}\""));
    }
}
