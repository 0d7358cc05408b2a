// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{external_id, task_at, tasks_inside, Fixture, INSTALLATION};
use fleet_dispatch_core::application::dispatch::{
    DispatchOutcome, AREA_MISMATCH_REASON, LOCALIZATION_FAILED_REASON, LOST_CONNECTION_REASON,
};
use fleet_dispatch_core::domain::area::InspectionAreaId;
use fleet_dispatch_core::domain::errors::DispatchError;
use fleet_dispatch_core::domain::events::AlertEvent;
use fleet_dispatch_core::domain::mission::{
    Inspection, InspectionType, MissionRun, MissionRunType, MissionStatus, MissionTask, Pose, TaskStatus,
};
use fleet_dispatch_core::domain::precondition::DenialReason;
use fleet_dispatch_core::domain::repository::RobotRepository;
use fleet_dispatch_core::domain::robot::{Robot, RobotModel, RobotStatus, RobotThresholds, RobotUpdate};
use fleet_dispatch_core::domain::robot_control::RobotControlError;
use fleet_dispatch_core::infrastructure::event_bus::DomainEvent;

#[tokio::test]
async fn test_emergency_run_preempts_earlier_normal_run() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let t0 = Utc::now();
    let normal = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(2), t0)
        .await;
    let emergency = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::Emergency,
            tasks_inside(1),
            t0 + ChronoDuration::seconds(30),
        )
        .await;

    let outcome = fx.services.engine.dispatch(robot.id).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Started(emergency.id));
    assert_eq!(fx.robot_control.started(), vec![emergency.id]);
    assert_eq!(fx.run(normal.id).await.status, MissionStatus::Pending);
    let robot = fx.reload(&robot).await;
    assert_eq!(robot.status, RobotStatus::Busy);
    assert_eq!(robot.current_mission_run_id, Some(emergency.id));
}

#[tokio::test]
async fn test_frozen_queue_never_selects_normal_runs() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    fx.services.engine.set_mission_queue_frozen(robot.id, true).await.unwrap();
    let normal = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    assert_eq!(fx.services.engine.dispatch(robot.id).await.unwrap(), DispatchOutcome::Idle);
    assert!(fx.robot_control.started().is_empty());
    assert_eq!(fx.run(normal.id).await.status, MissionStatus::Pending);

    let emergency = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Emergency, tasks_inside(1), Utc::now())
        .await;
    assert_eq!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Started(emergency.id)
    );
    assert_eq!(fx.run(normal.id).await.status, MissionStatus::Pending);
}

#[tokio::test]
async fn test_frozen_queue_still_sends_robot_home() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    fx.services.engine.set_mission_queue_frozen(robot.id, true).await.unwrap();
    fx.queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;
    let home = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::ReturnHome,
            vec![MissionTask::return_home(Pose::default())],
            Utc::now(),
        )
        .await;

    assert_eq!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Started(home.id)
    );
}

#[tokio::test]
async fn test_unfreezing_dispatches_queued_normal_run() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    fx.services.engine.set_mission_queue_frozen(robot.id, true).await.unwrap();
    let normal = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    let robot = fx.services.engine.set_mission_queue_frozen(robot.id, false).await.unwrap();

    assert!(!robot.mission_queue_frozen);
    assert_eq!(fx.robot_control.started(), vec![normal.id]);
}

#[tokio::test]
async fn test_second_dispatch_is_a_noop_while_running() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let t0 = Utc::now();
    let first = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), t0)
        .await;
    fx.queue_run(
        &robot,
        Some(area.id),
        MissionRunType::Normal,
        tasks_inside(1),
        t0 + ChronoDuration::seconds(1),
    )
    .await;

    assert_eq!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Started(first.id)
    );
    let second = fx.services.engine.dispatch(robot.id).await.unwrap();

    assert_eq!(second, DispatchOutcome::Deferred(DenialReason::NotAvailable(RobotStatus::Busy)));
    assert_eq!(fx.robot_control.started().len(), 1);
    assert_eq!(fx.services.queue.ongoing(robot.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_dispatches_start_one_run() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    fx.queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;
    fx.queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    let (a, b) = tokio::join!(
        fx.services.engine.dispatch(robot.id),
        fx.services.engine.dispatch(robot.id)
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let started = outcomes
        .iter()
        .filter(|o| matches!(o, DispatchOutcome::Started(_)))
        .count();
    assert_eq!(started, 1);
    assert_eq!(fx.robot_control.started().len(), 1);
    assert_eq!(fx.services.queue.ongoing(robot.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_task_outside_area_aborts_all_pending_normal_runs() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let t0 = Utc::now();
    let outside = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::Normal,
            vec![task_at(0, 15.0, 5.0, 3.0)],
            t0,
        )
        .await;
    let inside = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::Normal,
            tasks_inside(1),
            t0 + ChronoDuration::seconds(10),
        )
        .await;
    let home = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::ReturnHome,
            vec![MissionTask::return_home(Pose::default())],
            t0,
        )
        .await;

    let outcome = fx.services.engine.dispatch(robot.id).await.unwrap();

    assert_eq!(
        outcome,
        DispatchOutcome::Aborted {
            count: 2,
            reason: AREA_MISMATCH_REASON.to_string()
        }
    );
    assert!(fx.robot_control.started().is_empty());
    for id in [outside.id, inside.id] {
        let run = fx.run(id).await;
        assert_eq!(run.status, MissionStatus::Aborted);
        assert_eq!(run.error_reason.as_deref(), Some(AREA_MISMATCH_REASON));
    }
    assert_eq!(fx.run(home.id).await.status, MissionStatus::Pending);
}

#[tokio::test]
async fn test_low_battery_aborts_normal_runs_and_spares_return_home() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    fx.services.status_handler.on_battery(robot.id, 10.0).await.unwrap();
    let t0 = Utc::now();
    let first = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), t0)
        .await;
    let second = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::Normal,
            tasks_inside(1),
            t0 + ChronoDuration::seconds(5),
        )
        .await;
    let home = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::ReturnHome,
            vec![MissionTask::return_home(Pose::default())],
            t0,
        )
        .await;
    let mut alerts = fx.services.event_bus.subscribe();

    let outcome = fx.services.engine.dispatch(robot.id).await.unwrap();

    let DispatchOutcome::Aborted { count, reason } = outcome else {
        panic!("expected abort, got {:?}", outcome);
    };
    assert_eq!(count, 2);
    assert!(reason.contains("battery"));
    for id in [first.id, second.id] {
        let run = fx.run(id).await;
        assert_eq!(run.status, MissionStatus::Aborted);
        assert!(run.error_reason.unwrap().contains("battery"));
    }
    assert_eq!(fx.run(home.id).await.status, MissionStatus::Pending);
    assert!(fx.robot_control.started().is_empty());

    let mut alerted = false;
    while let Ok(event) = alerts.try_recv() {
        if let DomainEvent::Alert(AlertEvent::NormalMissionsAborted { aborted_count, .. }) = event {
            assert_eq!(aborted_count, 2);
            alerted = true;
        }
    }
    assert!(alerted);
}

#[tokio::test]
async fn test_pressure_out_of_range_aborts_normal_runs() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let model = RobotModel {
        thresholds: RobotThresholds {
            battery_low: 20.0,
            pressure_low: Some(10.0),
            pressure_high: Some(50.0),
        },
        ..RobotModel::default()
    };
    let robot = fx.robot_with(model, Some(area.id)).await;
    fx.services.status_handler.on_pressure(robot.id, Some(70.0)).await.unwrap();
    let run = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    let outcome = fx.services.engine.dispatch(robot.id).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::Aborted { count: 1, ref reason } if reason.contains("pressure")));
    assert_eq!(fx.run(run.id).await.status, MissionStatus::Aborted);
}

#[tokio::test]
async fn test_abort_all_leaves_emergency_runs_untouched() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let normal = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;
    let emergency = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Emergency, tasks_inside(1), Utc::now())
        .await;

    let count = fx
        .services
        .engine
        .abort_all_scheduled_normal_missions(robot.id, "Aborted: operator request")
        .await
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(fx.run(normal.id).await.status, MissionStatus::Aborted);
    assert_eq!(fx.run(emergency.id).await.status, MissionStatus::Pending);
}

#[tokio::test]
async fn test_runs_that_cannot_be_executed_are_aborted_alone() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let t0 = Utc::now();
    let gas = MissionTask::inspection(
        0,
        Pose::at(2.0, 2.0, 1.0),
        Some("TAG-GAS".into()),
        vec![Inspection::new(InspectionType::GasMeasurement)],
    );
    let unsupported = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, vec![gas], t0)
        .await;
    let unknown_area = fx
        .queue_run(
            &robot,
            Some(InspectionAreaId::new()),
            MissionRunType::Normal,
            tasks_inside(1),
            t0 + ChronoDuration::seconds(1),
        )
        .await;
    let fine = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::Normal,
            tasks_inside(1),
            t0 + ChronoDuration::seconds(2),
        )
        .await;

    assert!(matches!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Aborted { count: 1, .. }
    ));
    assert!(matches!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Aborted { count: 1, .. }
    ));
    assert_eq!(fx.run(unsupported.id).await.status, MissionStatus::Aborted);
    assert_eq!(fx.run(unknown_area.id).await.status, MissionStatus::Aborted);

    assert_eq!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Started(fine.id)
    );
}

#[tokio::test]
async fn test_run_without_area_is_left_queued() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let run = fx
        .queue_run(&robot, None, MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    assert_eq!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::LeftQueued(run.id)
    );
    assert_eq!(fx.run(run.id).await.status, MissionStatus::Pending);
}

#[tokio::test]
async fn test_first_dispatch_adopts_run_area_and_queues_return_home() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(None).await;
    let run = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    assert_eq!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Started(run.id)
    );

    let robot = fx.reload(&robot).await;
    assert_eq!(robot.current_inspection_area_id, Some(area.id));
    let home = fx
        .services
        .queue
        .pending_of_type(robot.id, MissionRunType::ReturnHome)
        .await
        .unwrap();
    assert_eq!(home.len(), 1);
}

#[tokio::test]
async fn test_first_dispatch_does_not_geofence_against_adopted_area() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(None).await;
    let run = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::Normal,
            vec![task_at(0, 50.0, 50.0, 1.0)],
            Utc::now(),
        )
        .await;

    assert_eq!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Started(run.id)
    );
    assert_eq!(fx.run(run.id).await.status, MissionStatus::Ongoing);
    assert_eq!(fx.reload(&robot).await.current_inspection_area_id, Some(area.id));
}

#[tokio::test]
async fn test_stopped_run_requeues_unfinished_tasks_in_order() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let run = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(3), Utc::now())
        .await;
    fx.services.engine.dispatch(robot.id).await.unwrap();

    let external = external_id(run.id);
    let task_ids: Vec<String> = fx
        .run(run.id)
        .await
        .tasks()
        .iter()
        .map(|t| t.external_task_id.clone())
        .collect();
    let handler = &fx.services.status_handler;
    handler
        .on_task_status(&external, &task_ids[0], TaskStatus::Successful)
        .await
        .unwrap();
    handler
        .on_task_status(&external, &task_ids[1], TaskStatus::InProgress)
        .await
        .unwrap();

    let continuations = fx.services.engine.stop_current_mission_run(robot.id).await.unwrap();

    assert_eq!(fx.robot_control.stops(), 1);
    assert_eq!(continuations.len(), 1);
    let continuation = &continuations[0];
    assert_eq!(continuation.status, MissionStatus::Pending);
    assert_eq!(continuation.run_type, MissionRunType::Normal);
    assert_eq!(continuation.inspection_area_id, Some(area.id));
    let tags: Vec<_> = continuation
        .tasks()
        .iter()
        .map(|t| t.tag_id.clone().unwrap())
        .collect();
    assert_eq!(tags, vec!["TAG-1", "TAG-2"]);

    assert_eq!(fx.run(run.id).await.status, MissionStatus::Cancelled);
    assert_eq!(fx.reload(&robot).await.current_mission_run_id, None);
}

#[tokio::test]
async fn test_stopped_return_home_run_is_not_requeued() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let home = fx
        .queue_run(
            &robot,
            Some(area.id),
            MissionRunType::ReturnHome,
            vec![MissionTask::return_home(Pose::default())],
            Utc::now(),
        )
        .await;
    assert_eq!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Started(home.id)
    );

    let continuations = fx.services.engine.stop_current_mission_run(robot.id).await.unwrap();

    assert!(continuations.is_empty());
    assert_eq!(fx.run(home.id).await.status, MissionStatus::Cancelled);
}

#[tokio::test]
async fn test_unreachable_robot_on_start_goes_offline() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    fx.robot_control
        .fail_start_with(RobotControlError::Communication("connection refused".into()));
    let run = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    let err = fx.services.engine.dispatch(robot.id).await.unwrap_err();

    assert!(matches!(err, DispatchError::Communication(_)));
    let run = fx.run(run.id).await;
    assert_eq!(run.status, MissionStatus::Failed);
    assert_eq!(run.error_reason.as_deref(), Some("Failed to start mission on robot"));
    assert!(run.error_description.unwrap().contains("connection refused"));

    let robot = fx.reload(&robot).await;
    assert_eq!(robot.status, RobotStatus::Offline);
    assert!(!robot.connected);
    assert_eq!(robot.current_inspection_area_id, None);
    assert_eq!(robot.current_mission_run_id, None);
}

#[tokio::test]
async fn test_rejected_start_fails_run_but_keeps_robot_online() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    fx.robot_control
        .fail_start_with(RobotControlError::Conflict("mission already running".into()));
    let run = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    let err = fx.services.engine.dispatch(robot.id).await.unwrap_err();

    assert!(matches!(err, DispatchError::Protocol(_)));
    assert_eq!(fx.run(run.id).await.status, MissionStatus::Failed);
    let robot = fx.reload(&robot).await;
    assert_eq!(robot.status, RobotStatus::Available);
    assert!(robot.connected);
}

#[tokio::test]
async fn test_stop_on_unreachable_robot_runs_lost_connection_path() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let run = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(2), Utc::now())
        .await;
    fx.services.engine.dispatch(robot.id).await.unwrap();
    fx.robot_control
        .fail_stop_with(RobotControlError::Timeout("no answer".into()));

    let err = fx.services.engine.stop_current_mission_run(robot.id).await.unwrap_err();

    assert!(matches!(err, DispatchError::Communication(_)));
    let failed = fx.run(run.id).await;
    assert_eq!(failed.status, MissionStatus::Failed);
    assert_eq!(failed.error_reason.as_deref(), Some(LOST_CONNECTION_REASON));
    assert!(failed.tasks().iter().all(|t| t.status == TaskStatus::Failed));

    let requeued = fx
        .services
        .queue
        .pending_of_type(robot.id, MissionRunType::Normal)
        .await
        .unwrap();
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].tasks().len(), 2);
    assert_eq!(fx.reload(&robot).await.status, RobotStatus::Offline);
}

#[tokio::test]
async fn test_pause_and_resume_current_run() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let run = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;
    fx.services.engine.dispatch(robot.id).await.unwrap();

    let paused = fx.services.engine.pause_current_mission_run(robot.id).await.unwrap().unwrap();
    assert_eq!(paused.status, MissionStatus::Paused);
    assert_eq!(fx.services.queue.ongoing(robot.id).await.unwrap().len(), 1);

    let resumed = fx.services.engine.resume_current_mission_run(robot.id).await.unwrap().unwrap();
    assert_eq!(resumed.id, run.id);
    assert_eq!(resumed.status, MissionStatus::Ongoing);
}

async fn robot_busy_with_localization(
    fx: &Fixture,
    area_id: InspectionAreaId,
    robot_area: Option<InspectionAreaId>,
) -> (Robot, MissionRun) {
    let robot = fx.robot(robot_area).await;
    let localization = MissionRun::new(
        "Localization",
        robot.id,
        INSTALLATION,
        Some(area_id),
        MissionRunType::Emergency,
        vec![MissionTask::localization(Pose::default())],
    );
    let localization = fx.services.queue.create(localization, false).await.unwrap();
    fx.services
        .queue
        .set_status(localization.id, MissionStatus::Ongoing, None)
        .await
        .unwrap();
    fx.services
        .repositories
        .robots
        .update(robot.id, RobotUpdate::CurrentMissionRun(Some(localization.id)))
        .await
        .unwrap();
    (robot, localization)
}

#[tokio::test(start_paused = true)]
async fn test_localization_that_never_finishes_blocks_dispatch() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let (robot, _) = robot_busy_with_localization(&fx, area.id, Some(area.id)).await;
    let normal = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    let began = tokio::time::Instant::now();
    let err = fx.services.engine.dispatch(robot.id).await.unwrap_err();

    assert!(matches!(err, DispatchError::LocalizationTimeout { .. }));
    assert!(began.elapsed() >= Duration::from_secs(5));
    assert!(fx.robot_control.started().is_empty());
    assert_eq!(fx.run(normal.id).await.status, MissionStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_localization_finishing_during_wait_unblocks_dispatch() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let (robot, localization) = robot_busy_with_localization(&fx, area.id, None).await;
    let normal = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    let queue = fx.services.queue.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        queue
            .set_status(localization.id, MissionStatus::Successful, None)
            .await
            .unwrap();
    });

    let outcome = fx.services.engine.dispatch(robot.id).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Started(normal.id));
    assert_eq!(fx.reload(&robot).await.current_inspection_area_id, Some(area.id));
}

#[tokio::test]
async fn test_robot_without_area_is_localized_before_normal_run() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let model = RobotModel {
        requires_localization: true,
        ..RobotModel::default()
    };
    let robot = fx.robot_with(model, None).await;
    let normal = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;

    let DispatchOutcome::LocalizationStarted(localization_id) = fx.services.engine.dispatch(robot.id).await.unwrap()
    else {
        panic!("expected a localization run");
    };

    let localization = fx.run(localization_id).await;
    assert!(localization.is_localization());
    assert_eq!(localization.status, MissionStatus::Ongoing);
    assert_eq!(localization.tasks()[0].robot_pose, Pose::at(1.0, 1.0, 0.0));
    assert_eq!(fx.robot_control.started(), vec![localization_id]);
    assert_eq!(fx.run(normal.id).await.status, MissionStatus::Pending);
    let busy = fx.reload(&robot).await;
    assert_eq!(busy.current_inspection_area_id, Some(area.id));
    assert_eq!(busy.current_mission_run_id, Some(localization_id));

    let handler = &fx.services.status_handler;
    handler
        .on_mission_status(&external_id(localization_id), MissionStatus::Successful)
        .await
        .unwrap();
    handler.on_robot_status(robot.id, RobotStatus::Available).await.unwrap();

    assert_eq!(
        fx.services.engine.dispatch(robot.id).await.unwrap(),
        DispatchOutcome::Started(normal.id)
    );
    assert_eq!(fx.reload(&robot).await.current_inspection_area_id, Some(area.id));
}

#[tokio::test]
async fn test_failed_localization_clears_area_and_aborts_normal_runs() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let model = RobotModel {
        requires_localization: true,
        ..RobotModel::default()
    };
    let robot = fx.robot_with(model, None).await;
    let normal = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;
    let DispatchOutcome::LocalizationStarted(localization_id) = fx.services.engine.dispatch(robot.id).await.unwrap()
    else {
        panic!("expected a localization run");
    };
    let mut events = fx.services.event_bus.subscribe();

    fx.services
        .status_handler
        .on_mission_status(&external_id(localization_id), MissionStatus::Failed)
        .await
        .unwrap();

    let robot = fx.reload(&robot).await;
    assert_eq!(robot.current_inspection_area_id, None);
    assert_eq!(robot.current_mission_run_id, None);
    let normal = fx.run(normal.id).await;
    assert_eq!(normal.status, MissionStatus::Aborted);
    assert_eq!(normal.error_reason.as_deref(), Some(LOCALIZATION_FAILED_REASON));

    let mut alerted = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, DomainEvent::Alert(AlertEvent::LocalizationFailed { .. })) {
            alerted = true;
        }
    }
    assert!(alerted);
}

#[tokio::test]
async fn test_stopped_localization_leaves_robot_unlocalized() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let model = RobotModel {
        requires_localization: true,
        ..RobotModel::default()
    };
    let robot = fx.robot_with(model, None).await;
    let normal = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;
    let DispatchOutcome::LocalizationStarted(localization_id) = fx.services.engine.dispatch(robot.id).await.unwrap()
    else {
        panic!("expected a localization run");
    };
    let mut events = fx.services.event_bus.subscribe();

    let continuations = fx.services.engine.stop_current_mission_run(robot.id).await.unwrap();

    assert!(continuations.is_empty());
    assert_eq!(fx.run(localization_id).await.status, MissionStatus::Cancelled);
    let stopped = fx.reload(&robot).await;
    assert_eq!(stopped.current_inspection_area_id, None);
    assert_eq!(stopped.current_mission_run_id, None);
    let mut alerted = false;
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::Alert(AlertEvent::LocalizationFailed { mission_run_id, .. }) = event {
            assert_eq!(mission_run_id, localization_id);
            alerted = true;
        }
    }
    assert!(alerted);

    // The normal run waits for a fresh localization instead of starting
    fx.services
        .status_handler
        .on_robot_status(robot.id, RobotStatus::Available)
        .await
        .unwrap();
    let outcome = fx.services.engine.dispatch(robot.id).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::LocalizationStarted(id) if id != localization_id));
    assert_eq!(fx.run(normal.id).await.status, MissionStatus::Pending);
    assert!(!fx.robot_control.started().contains(&normal.id));
}

#[tokio::test]
async fn test_stale_status_report_is_ignored() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let run = fx
        .queue_run(&robot, Some(area.id), MissionRunType::Normal, tasks_inside(1), Utc::now())
        .await;
    fx.services.engine.dispatch(robot.id).await.unwrap();
    let handler = &fx.services.status_handler;
    let external = external_id(run.id);

    handler
        .on_mission_status(&external, MissionStatus::Successful)
        .await
        .unwrap();
    let after = handler
        .on_mission_status(&external, MissionStatus::Ongoing)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(after.status, MissionStatus::Successful);
    assert_eq!(fx.reload(&robot).await.current_mission_run_id, None);
    assert!(handler
        .on_mission_status("unknown", MissionStatus::Failed)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_missed_heartbeat_marks_robot_offline() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let monitor = &fx.services.connection_monitor;

    monitor.heartbeat(robot.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    monitor.heartbeat(robot.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(fx.reload(&robot).await.connected);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let offline = fx.reload(&robot).await;
    assert!(!offline.connected);
    assert_eq!(offline.status, RobotStatus::Offline);
    assert_eq!(offline.current_inspection_area_id, None);
    assert!(!monitor.is_watching(robot.id));

    monitor.heartbeat(robot.id).await.unwrap();
    let back = fx.reload(&robot).await;
    assert!(back.connected);
    assert_eq!(back.status, RobotStatus::Available);
    assert!(monitor.is_watching(robot.id));
}

#[tokio::test]
async fn test_superseded_heartbeat_deadline_keeps_robot_online() {
    let fx = Fixture::with_manual_jobs();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let monitor = &fx.services.connection_monitor;
    fx.jobs.refuse_all_cancels();

    monitor.heartbeat(robot.id).await.unwrap();
    monitor.heartbeat(robot.id).await.unwrap();
    let deadlines = fx.jobs.scheduled();
    assert_eq!(deadlines.len(), 2);

    // The first deadline could not be cancelled and fires anyway
    fx.jobs.fire(&deadlines[0]).await;
    let online = fx.reload(&robot).await;
    assert!(online.connected);
    assert_eq!(online.status, RobotStatus::Available);
    assert_eq!(online.current_inspection_area_id, Some(area.id));
    assert!(monitor.is_watching(robot.id));

    fx.jobs.fire(&deadlines[1]).await;
    let offline = fx.reload(&robot).await;
    assert!(!offline.connected);
    assert_eq!(offline.status, RobotStatus::Offline);
    assert!(!monitor.is_watching(robot.id));
}

#[tokio::test]
async fn test_listener_dispatches_notified_runs() {
    let fx = Fixture::new();
    let area = fx.area().await;
    let robot = fx.robot(Some(area.id)).await;
    let shutdown = CancellationToken::new();
    let handles = fx.services.start(shutdown.clone());

    let run = MissionRun::new(
        "Inspection round",
        robot.id,
        INSTALLATION,
        Some(area.id),
        MissionRunType::Normal,
        tasks_inside(1),
    );
    let run = fx.services.queue.create(run, true).await.unwrap();

    let mut started = Vec::new();
    for _ in 0..200 {
        started = fx.robot_control.started();
        if !started.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(started, vec![run.id]);

    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}
