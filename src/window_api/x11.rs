use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::instrument;
use xcb::{
    x::{
        self, Atom, Drawable, GetImage, GetProperty, GrabServer, ImageFormat, InternAtom,
        UngrabServer, Window, ATOM_ANY,
    },
    Connection, Xid,
};

use super::{ActiveWindowData, ScreenCapturer, WindowManager};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

/// Short application name of a process, e.g. `code` or `firefox`.
fn get_app_name(system: &mut System, id: u32) -> Option<String> {
    let pid = Pid::from_u32(id);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|process| process.name().to_string_lossy().into_owned())
}

fn get_active_window(conn: &Connection, root: Window, active_window_atom: Atom) -> Result<Option<Window>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result
        .value::<Window>()
        .first()
        .copied()
        .filter(|window| window.resource_id() != 0))
}

fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).into_owned())
}

fn root_screen(conn: &Connection, preferred_screen: i32) -> Result<&x::Screen> {
    conn.get_setup()
        .roots()
        .nth(preferred_screen.max(0) as usize)
        .ok_or_else(|| anyhow!("X11 screen {preferred_screen} does not exist"))
}

pub struct LinuxWindowManager {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
    system: System,
}

impl LinuxWindowManager {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            window_name_atom,
            pid_atom,
            system: System::new(),
        })
    }

    #[instrument(skip(self))]
    fn get_active_inner(&mut self) -> Result<Option<ActiveWindowData>> {
        // Currently the application only supports 1 x11 screen.
        let root = root_screen(&self.connection, self.preferred_screen)?.root();

        let Some(active_window) =
            get_active_window(&self.connection, root, self.active_window_atom)?
        else {
            return Ok(None);
        };
        let window_title = get_name(&self.connection, active_window, self.window_name_atom)?;
        let app_name = get_pid(&self.connection, active_window, self.pid_atom)?
            .and_then(|pid| get_app_name(&mut self.system, pid))
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Some(ActiveWindowData {
            window_title: window_title.into(),
            app_name: app_name.into(),
        }))
    }
}

impl WindowManager for LinuxWindowManager {
    #[instrument(skip(self))]
    fn get_active_window_data(&mut self) -> Result<Option<ActiveWindowData>> {
        let _ = self.connection.send_request(&GrabServer {});

        let result = self.get_active_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }
}

/// Reads the root window pixels through `GetImage`.
pub struct LinuxScreenCapturer {
    connection: Connection,
    preferred_screen: i32,
}

impl LinuxScreenCapturer {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        Ok(Self {
            connection,
            preferred_screen,
        })
    }
}

impl ScreenCapturer for LinuxScreenCapturer {
    #[instrument(skip(self))]
    fn capture_screen(&mut self) -> Result<Vec<u8>> {
        let screen = root_screen(&self.connection, self.preferred_screen)?;
        let image = self.connection.wait_for_reply(self.connection.send_request(&GetImage {
            format: ImageFormat::ZPixmap,
            drawable: Drawable::Window(screen.root()),
            x: 0,
            y: 0,
            width: screen.width_in_pixels(),
            height: screen.height_in_pixels(),
            plane_mask: u32::MAX,
        }))?;
        Ok(image.data().to_vec())
    }
}
