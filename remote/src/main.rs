//! 遥控器模拟器：在共享模拟空口上与模拟主机配对，并通过控制台下发命令。

use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use common::hal::simulator::{SimAir, SimClock, SimHardware, SimPreferences};
use common::protocol::speed_name;
use common::{EngineConfig, FanCall, FanController, Hardware};
use crossbeam::channel::{unbounded, Receiver, TryRecvError};
use embedded_hal::blocking::delay::DelayMs;
use log::{error, info, warn};
use unit::{MainUnit, UNIT_SPEED_COUNT};

const UNIT_ID: u8 = 0x22;
const UNIT_NETWORK: u32 = 0xA55A_1234;
/// 调度周期
const TICK_MS: u32 = 5;
/// 模拟环境下缩短上电等待
const STARTUP_DELAY_MS: u32 = 1_000;
const POLL_INTERVAL_MS: u32 = 10_000;
/// 与真机的配对记录分开存放
const PREFERENCE_NAME: &str = "fanlink-sim-pairing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Speed(u8),
    Timer(u8, u8),
    On,
    Off,
    Status,
    Config,
    Quit,
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let mut parts = line.split_whitespace();
    let command = match parts.next()? {
        "speed" => ConsoleCommand::Speed(parts.next()?.parse().ok()?),
        "timer" => {
            let speed = parts.next()?.parse().ok()?;
            let minutes = parts.next()?.parse().ok()?;
            ConsoleCommand::Timer(speed, minutes)
        }
        "on" => ConsoleCommand::On,
        "off" => ConsoleCommand::Off,
        "status" => ConsoleCommand::Status,
        "config" => ConsoleCommand::Config,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => return None,
    };
    Some(command)
}

fn spawn_console() -> Receiver<ConsoleCommand> {
    let (sender, receiver) = unbounded();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            match parse_command(line.trim()) {
                Some(command) => {
                    if sender.send(command).is_err() {
                        break;
                    }
                }
                None => println!("用法: speed <0-4> | timer <档位> <分钟> | on | off | status | config | quit"),
            }
        }
    });
    receiver
}

fn spawn_unit(air: &SimAir) {
    let radio = air.station();
    thread::spawn(move || {
        let mut unit = match MainUnit::new(radio, UNIT_ID, UNIT_NETWORK) {
            Ok(unit) => unit,
            Err(e) => {
                error!("Main unit radio setup failed: {:?}", e);
                return;
            }
        };
        if let Err(e) = unit.open_pairing() {
            error!("Main unit could not open pairing: {:?}", e);
            return;
        }
        loop {
            unit.poll();
            thread::sleep(Duration::from_millis(1));
        }
    });
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    println!("启动遥控器（模拟器模式）");

    let air = SimAir::new();
    spawn_unit(&air);

    let hardware = SimHardware::new(&air, SimClock::system(), SimPreferences::new(), 0x5EED);
    let config = EngineConfig::default()
        .with_startup_delay(STARTUP_DELAY_MS)
        .with_poll_interval(POLL_INTERVAL_MS)
        .with_speed_count(UNIT_SPEED_COUNT)
        .with_preference_name(PREFERENCE_NAME);
    let mut controller = match FanController::new(hardware, config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Radio setup failed: {}", e);
            return;
        }
    };
    controller.log_config();

    let console = spawn_console();
    let mut healthy = controller.is_healthy();

    loop {
        match console.try_recv() {
            Ok(ConsoleCommand::Speed(speed)) => controller.request_speed(speed, 0),
            Ok(ConsoleCommand::Timer(speed, minutes)) => controller.request_speed(speed, minutes),
            Ok(ConsoleCommand::On) => controller.control(FanCall::turn_on()),
            Ok(ConsoleCommand::Off) => controller.control(FanCall::turn_off()),
            Ok(ConsoleCommand::Status) => {
                let status = controller.status();
                println!(
                    "状态: {} | 风速 {} ({}) | 电压 {}% | 定时 {} 分钟 | 协议 {} | 链路 {}",
                    if status.on { "开" } else { "关" },
                    status.speed,
                    speed_name(status.speed),
                    status.voltage,
                    status.timer,
                    controller.state(),
                    if controller.is_healthy() { "正常" } else { "异常" }
                );
            }
            Ok(ConsoleCommand::Config) => controller.log_config(),
            Ok(ConsoleCommand::Quit) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        controller.tick();
        while let Some(event) = controller.hardware_mut().get_radio().poll_event() {
            // 与当前状态不符的帧已在引擎内记录
            let _ = controller.handle_event(event);
        }

        if let Some(status) = controller.take_status_update() {
            info!(
                "Fan status published: speed {} ({}) voltage {}% timer {} min",
                status.speed,
                speed_name(status.speed),
                status.voltage,
                status.timer
            );
        }
        if controller.is_healthy() != healthy {
            healthy = controller.is_healthy();
            warn!("Link health changed: {}", if healthy { "healthy" } else { "unhealthy" });
        }

        controller.hardware_mut().delay_ms(TICK_MS);
    }

    println!("退出");
}
