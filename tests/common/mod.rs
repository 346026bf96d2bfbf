//! Shared fixtures for integration tests.

#![allow(dead_code)] // each test binary uses a subset

use indexmap::IndexMap;

use redarena::arena::{ArenaId, ArenaSettings, ParticipantId};
use redarena::scenario::schema::{
    CaptureContent, CaptureMove, CommandRaceContent, DialogueContent, Difficulty,
    ForensicsContent, ModeContent, MoveEffect, MoveKind, Question, Scenario, SpeedBonus, Stage,
    StageCommand, Technique, VulnRaceContent, Vulnerability,
};
use redarena::session::ArenaSession;

pub const SEED: u64 = 42;

pub fn pid(s: &str) -> ParticipantId {
    ParticipantId::new(s)
}

fn scenario(id: &str, time_limit: u64, content: ModeContent) -> Scenario {
    Scenario {
        id: id.to_string(),
        name: id.to_string(),
        difficulty: Difficulty::Medium,
        time_limit,
        min_participants: 1,
        max_participants: 8,
        content,
    }
}

pub fn capture_scenario() -> Scenario {
    scenario(
        "beachhead",
        300_000,
        ModeContent::CaptureHold(CaptureContent {
            max_energy: 100,
            energy_regen_per_sec: 2.0,
            points_per_second: 2,
            milestone_5s_bonus: 10,
            milestone_60s_bonus: 100,
            moves: vec![
                CaptureMove {
                    id: "exploit".to_string(),
                    name: "Remote exploit".to_string(),
                    kind: MoveKind::Attack,
                    energy_cost: 25,
                    cooldown_ms: 3_000,
                    success_rate: 100,
                    effect: MoveEffect::Capture,
                },
                CaptureMove {
                    id: "recon".to_string(),
                    name: "Port scan".to_string(),
                    kind: MoveKind::Attack,
                    energy_cost: 5,
                    cooldown_ms: 1_000,
                    success_rate: 100,
                    effect: MoveEffect::Points { points: 3 },
                },
                CaptureMove {
                    id: "harden".to_string(),
                    name: "Harden service".to_string(),
                    kind: MoveKind::Defense,
                    energy_cost: 20,
                    cooldown_ms: 0,
                    success_rate: 100,
                    effect: MoveEffect::DefenseLevel { bonus: 1 },
                },
                CaptureMove {
                    id: "honeypot".to_string(),
                    name: "Deploy honeypot".to_string(),
                    kind: MoveKind::Defense,
                    energy_cost: 35,
                    cooldown_ms: 0,
                    success_rate: 100,
                    effect: MoveEffect::Block,
                },
            ],
        }),
    )
}

pub fn command_race_scenario() -> Scenario {
    scenario(
        "recon-race",
        180_000,
        ModeContent::CommandRace(CommandRaceContent {
            default_response: "command not found".to_string(),
            stages: vec![
                Stage {
                    prompt: "Find your footing.".to_string(),
                    commands: vec![
                        StageCommand {
                            input: "whoami".to_string(),
                            response: "www-data".to_string(),
                            progress_delta: 5,
                            advance_stage: false,
                            completes: false,
                        },
                        StageCommand {
                            input: "ls -la /var/www".to_string(),
                            response: "creds.db".to_string(),
                            progress_delta: 10,
                            advance_stage: true,
                            completes: false,
                        },
                    ],
                    default_response: None,
                },
                Stage {
                    prompt: "Escalate.".to_string(),
                    commands: vec![StageCommand {
                        input: "submit FLAG{bad_sudo_rules}".to_string(),
                        response: "accepted".to_string(),
                        progress_delta: 30,
                        advance_stage: false,
                        completes: true,
                    }],
                    default_response: Some("permission denied".to_string()),
                },
            ],
        }),
    )
}

pub fn forensics_scenario() -> Scenario {
    let mut questions = IndexMap::new();
    questions.insert(
        "filesystem".to_string(),
        Question {
            prompt: "What filesystem does the image use?".to_string(),
            answers: vec!["fat32".to_string(), "vfat".to_string()],
            points: 10,
            hint: Some("Check the boot sector.".to_string()),
        },
    );
    questions.insert(
        "dropper".to_string(),
        Question {
            prompt: "Name the autorun executable.".to_string(),
            answers: vec!["updater.exe".to_string()],
            points: 20,
            hint: None,
        },
    );
    let mut s = scenario(
        "usb-triage",
        600_000,
        ModeContent::Forensics(ForensicsContent {
            questions,
            wrong_answer_penalty: 5,
            first_try_bonus: 10,
            perfect_bonus: 50,
            speed_bonus: Some(SpeedBonus {
                within: 240_000,
                points: 40,
            }),
        }),
    );
    // The usb-triage demo caps at 4 participants.
    s.max_participants = 4;
    s
}

pub fn vuln_race_scenario() -> Scenario {
    let mut vulnerabilities = IndexMap::new();
    vulnerabilities.insert(
        "sqli".to_string(),
        Vulnerability {
            name: "Login SQL injection".to_string(),
            flag: "FLAG{union_select}".to_string(),
            points: 40,
            hint: Some("The username field is concatenated.".to_string()),
        },
    );
    vulnerabilities.insert(
        "idor".to_string(),
        Vulnerability {
            name: "Order IDOR".to_string(),
            flag: "FLAG{sequential_ids}".to_string(),
            points: 30,
            hint: None,
        },
    );
    scenario(
        "webapp-hunt",
        600_000,
        ModeContent::VulnRace(VulnRaceContent {
            vulnerabilities,
            invalid_penalty: 10,
        }),
    )
}

pub fn dialogue_scenario() -> Scenario {
    let mut objectives = IndexMap::new();
    objectives.insert("badge_vendor".to_string(), "Badge vendor".to_string());
    objectives.insert("vpn_portal".to_string(), "VPN portal".to_string());

    let mut techniques = IndexMap::new();
    techniques.insert(
        "smalltalk".to_string(),
        Technique {
            name: "Build rapport".to_string(),
            suspicion_impact: 0,
            reveals: vec![],
            reply: "What can I do for you?".to_string(),
        },
    );
    techniques.insert(
        "new_hire_pretext".to_string(),
        Technique {
            name: "New-hire pretext".to_string(),
            suspicion_impact: 10,
            reveals: vec!["badge_vendor".to_string()],
            reply: "Badges come from SecurePass.".to_string(),
        },
    );
    techniques.insert(
        "it_impersonation".to_string(),
        Technique {
            name: "Impersonate IT".to_string(),
            suspicion_impact: 25,
            reveals: vec!["vpn_portal".to_string()],
            reply: "Right, vpn.corp.example.".to_string(),
        },
    );
    techniques.insert(
        "direct_demand".to_string(),
        Technique {
            name: "Demand credentials".to_string(),
            suspicion_impact: 80,
            reveals: vec![],
            reply: "I'm reporting this call.".to_string(),
        },
    );
    scenario(
        "helpdesk-call",
        480_000,
        ModeContent::Dialogue(DialogueContent {
            objectives,
            techniques,
            suspicion_threshold: 100,
            max_turns: 12,
            objective_points: 25,
        }),
    )
}

/// A session in the lobby with the given host, at t=0.
pub fn lobby(scenario: Scenario, host: &str) -> ArenaSession {
    ArenaSession::new(
        ArenaId::new("test-arena"),
        scenario,
        pid(host),
        host.to_string(),
        ArenaSettings::default(),
        SEED,
        0,
    )
}

/// A session with the given settings, host plus extra ready participants,
/// started at `start_ms`.
pub fn started(
    scenario: Scenario,
    settings: ArenaSettings,
    host: &str,
    others: &[&str],
    start_ms: u64,
) -> ArenaSession {
    let mut session = ArenaSession::new(
        ArenaId::new("test-arena"),
        scenario,
        pid(host),
        host.to_string(),
        settings,
        SEED,
        0,
    );
    for other in others {
        session.join(pid(other), (*other).to_string(), 0).unwrap();
        session.set_ready(&pid(other), true).unwrap();
    }
    session.start(&pid(host), start_ms).unwrap();
    session
}
